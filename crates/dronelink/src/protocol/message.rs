//! Typed messages carried in frame payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codec::encode_frame;
use super::error::{DecodeError, EncodeError, FramingError, ProtocolError};

/// `msg_type` of a window capacity message.
pub const MSG_LAST_POINTS: &str = "last_points_number";

/// `msg_type` of a coordinate batch.
pub const MSG_COORDS: &str = "coords";

/// `msg_type` of the end-of-stream signal.
pub const MSG_END: &str = "END";

/// `msg_type` of a disconnect request.
pub const MSG_DISCONNECT: &str = "!DISCONNECT";

/// Largest `last_points_number` accepted from a producer.
pub const MAX_LAST_POINTS: usize = 100_000;

const KNOWN_TYPES: [&str; 4] = [MSG_LAST_POINTS, MSG_COORDS, MSG_END, MSG_DISCONNECT];

/// A single drone position.
///
/// `w` is only sent by some producers; when absent it stays `None` rather
/// than defaulting to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    /// East coordinate.
    pub x: f64,
    /// North coordinate.
    pub y: f64,
    /// Altitude.
    pub z: f64,
    /// Optional extra channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
}

impl PointRecord {
    /// Create a point without the optional `w` channel.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, w: None }
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type")]
pub enum Message {
    /// Keep this many points per drone in newly created windows.
    #[serde(rename = "last_points_number")]
    LastPointsConfig {
        /// Window capacity.
        last_points_number: usize,
    },

    /// One batch of positions, one per drone, in drone order.
    #[serde(rename = "coords")]
    Coordinates {
        /// Points in batch order; position `i` belongs to drone `i + 1`.
        coords: Vec<PointRecord>,
    },

    /// No more points will follow for the consumer.
    #[serde(rename = "END")]
    End,

    /// The peer is about to close the connection.
    #[serde(rename = "!DISCONNECT")]
    Disconnect,
}

impl Message {
    /// The wire `msg_type` of this message.
    #[must_use]
    pub fn msg_type(&self) -> &'static str {
        match self {
            Self::LastPointsConfig { .. } => MSG_LAST_POINTS,
            Self::Coordinates { .. } => MSG_COORDS,
            Self::End => MSG_END,
            Self::Disconnect => MSG_DISCONNECT,
        }
    }

    /// Serialize and frame this message for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`encode_message`].
    pub fn to_frame(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(encode_frame(&encode_message(self)?))
    }
}

/// Serialize a message into its JSON payload.
///
/// JSON has no NaN or infinity; `serde_json` would write them as `null`,
/// which the decoder rejects. Such points are refused here instead.
///
/// # Errors
///
/// Returns [`EncodeError::NonFinite`] if a coordinate is NaN or infinite,
/// or [`EncodeError::Json`] if serialization fails.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, EncodeError> {
    if let Message::Coordinates { coords } = message {
        if let Some(index) = coords.iter().position(|p| !p.is_finite()) {
            return Err(EncodeError::NonFinite { index });
        }
    }
    Ok(serde_json::to_vec(message)?)
}

/// Decode a JSON payload into a [`Message`].
///
/// The `msg_type` tag is inspected first so that an unknown kind is a
/// skippable [`ProtocolError`] while a broken payload is a
/// [`FramingError`].
///
/// # Errors
///
/// Returns [`DecodeError::Framing`] for invalid UTF-8, invalid JSON, a
/// missing tag or missing fields, and [`DecodeError::Protocol`] for an
/// unknown tag or a capacity of zero or above [`MAX_LAST_POINTS`].
pub fn decode_message(payload: &[u8]) -> Result<Message, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|e| FramingError::malformed(e.to_string()))?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| FramingError::malformed(e.to_string()))?;

    let msg_type = value
        .get("msg_type")
        .and_then(Value::as_str)
        .ok_or_else(|| FramingError::malformed("missing string field msg_type"))?;

    if !KNOWN_TYPES.contains(&msg_type) {
        return Err(ProtocolError::UnknownType {
            msg_type: msg_type.to_string(),
        }
        .into());
    }

    let message: Message =
        serde_json::from_value(value).map_err(|e| FramingError::malformed(e.to_string()))?;

    if let Message::LastPointsConfig { last_points_number } = message {
        if last_points_number == 0 {
            return Err(ProtocolError::ZeroCapacity.into());
        }
        if last_points_number > MAX_LAST_POINTS {
            return Err(ProtocolError::CapacityTooLarge {
                requested: last_points_number,
                limit: MAX_LAST_POINTS,
            }
            .into());
        }
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_header, HEADER_LEN};

    #[test]
    fn test_decode_last_points_number() {
        let msg = decode_message(br#"{"msg_type":"last_points_number","last_points_number":3}"#)
            .unwrap();
        assert_eq!(
            msg,
            Message::LastPointsConfig {
                last_points_number: 3
            }
        );
    }

    #[test]
    fn test_decode_coords_preserves_order_and_missing_w() {
        let payload = br#"{"msg_type":"coords","coords":[
            {"x":1.5,"y":2.5,"z":3.5},
            {"x":-1.0,"y":0.0,"z":10.0,"w":0.25}
        ]}"#;
        let Message::Coordinates { coords } = decode_message(payload).unwrap() else {
            panic!("expected coordinates");
        };
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0], PointRecord::new(1.5, 2.5, 3.5));
        assert_eq!(coords[0].w, None);
        assert_eq!(coords[1].w, Some(0.25));
    }

    #[test]
    fn test_decode_end_and_disconnect() {
        assert_eq!(decode_message(br#"{"msg_type":"END"}"#).unwrap(), Message::End);
        assert_eq!(
            decode_message(br#"{"msg_type":"!DISCONNECT"}"#).unwrap(),
            Message::Disconnect
        );
    }

    #[test]
    fn test_decode_unknown_type_is_protocol_error() {
        let err = decode_message(br#"{"msg_type":"status","battery":0.5}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Protocol(ProtocolError::UnknownType { ref msg_type }) if msg_type == "status"
        ));
    }

    #[test]
    fn test_decode_zero_capacity_is_protocol_error() {
        let err = decode_message(br#"{"msg_type":"last_points_number","last_points_number":0}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Protocol(ProtocolError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_decode_oversized_capacity_is_protocol_error() {
        let err = decode_message(
            br#"{"msg_type":"last_points_number","last_points_number":18446744073709551615}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Protocol(ProtocolError::CapacityTooLarge {
                requested: usize::MAX,
                limit: MAX_LAST_POINTS,
            })
        ));

        let at_limit = format!(
            r#"{{"msg_type":"last_points_number","last_points_number":{MAX_LAST_POINTS}}}"#
        );
        assert_eq!(
            decode_message(at_limit.as_bytes()).unwrap(),
            Message::LastPointsConfig {
                last_points_number: MAX_LAST_POINTS
            }
        );
    }

    #[test]
    fn test_encode_rejects_non_finite_points() {
        let nan = Message::Coordinates {
            coords: vec![PointRecord::new(f64::NAN, 1.0, 2.0)],
        };
        assert!(matches!(
            nan.to_frame(),
            Err(EncodeError::NonFinite { index: 0 })
        ));

        let infinite_w = Message::Coordinates {
            coords: vec![
                PointRecord::new(1.0, 1.0, 1.0),
                PointRecord {
                    w: Some(f64::INFINITY),
                    ..PointRecord::new(2.0, 2.0, 2.0)
                },
            ],
        };
        let err = encode_message(&infinite_w).unwrap_err();
        assert!(matches!(err, EncodeError::NonFinite { index: 1 }));
        assert_eq!(err.to_string(), "point 1 has a non-finite coordinate");
    }

    #[test]
    fn test_decode_malformed_payloads_are_framing_errors() {
        let cases: [&[u8]; 6] = [
            b"",
            b"not json",
            &[0xff, 0xfe],
            br#"{"coords":[]}"#,
            br#"{"msg_type":7}"#,
            br#"{"msg_type":"coords","coords":[{"x":1.0}]}"#,
        ];
        for payload in cases {
            assert!(
                matches!(decode_message(payload), Err(DecodeError::Framing(_))),
                "payload {:?}",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn test_encode_uses_wire_tags() {
        let json = String::from_utf8(encode_message(&Message::Disconnect).unwrap()).unwrap();
        assert_eq!(json, r#"{"msg_type":"!DISCONNECT"}"#);

        let json = String::from_utf8(
            encode_message(&Message::Coordinates {
                coords: vec![PointRecord::new(1.0, 2.0, 3.0)],
            })
            .unwrap(),
        )
        .unwrap();
        assert!(json.contains(r#""msg_type":"coords""#));
        assert!(!json.contains("\"w\""));
    }

    #[test]
    fn test_msg_type_matches_serialized_tag() {
        let messages = [
            Message::LastPointsConfig {
                last_points_number: 5,
            },
            Message::Coordinates { coords: vec![] },
            Message::End,
            Message::Disconnect,
        ];
        for message in messages {
            let value: Value = serde_json::from_slice(&encode_message(&message).unwrap()).unwrap();
            assert_eq!(value["msg_type"], message.msg_type());
        }
    }

    #[test]
    fn test_coords_survive_the_wire_bit_for_bit() {
        let coords = vec![
            PointRecord::new(0.1 + 0.2, -8.123_456_789_012_345, 1e-300),
            PointRecord {
                x: f64::MAX,
                y: f64::MIN_POSITIVE,
                z: 12_345.678_9,
                w: Some(std::f64::consts::PI),
            },
        ];
        let message = Message::Coordinates {
            coords: coords.clone(),
        };

        let frame = message.to_frame().unwrap();
        let len = decode_header(&frame[..HEADER_LEN]).unwrap();
        assert_eq!(len, frame.len() - HEADER_LEN);

        let Message::Coordinates { coords: decoded } =
            decode_message(&frame[HEADER_LEN..]).unwrap()
        else {
            panic!("expected coordinates");
        };
        for (a, b) in coords.iter().zip(&decoded) {
            assert_eq!(a.x.to_bits(), b.x.to_bits());
            assert_eq!(a.y.to_bits(), b.y.to_bits());
            assert_eq!(a.z.to_bits(), b.z.to_bits());
            assert_eq!(a.w.map(f64::to_bits), b.w.map(f64::to_bits));
        }
    }
}
