//! Connection-scoped error taxonomy.

use thiserror::Error;

/// A header or payload could not be delimited or parsed.
///
/// Any framing error aborts the connection it occurred on.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The 64-byte header is not a non-negative decimal integer.
    #[error("invalid length header {header:?}")]
    InvalidHeader {
        /// The header text, lossily decoded and trimmed.
        header: String,
    },

    /// The announced payload exceeds the configured limit.
    #[error("payload size {size} exceeds limit {limit}")]
    TooLarge {
        /// Announced payload length.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The peer closed the stream in the middle of a frame.
    #[error("stream ended mid-frame: expected {expected} bytes, received {received}")]
    Truncated {
        /// Bytes needed to complete the frame.
        expected: usize,
        /// Bytes buffered when the stream ended.
        received: usize,
    },

    /// The payload is not valid UTF-8 JSON for a known message kind.
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// Description of the decoding failure.
        reason: String,
    },
}

impl FramingError {
    /// Create a malformed payload error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }
}

/// A well-framed message that the handler cannot act on.
///
/// Protocol errors are logged and the message is skipped; the connection
/// keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// `msg_type` names no known message kind.
    #[error("unrecognized msg_type {msg_type:?}")]
    UnknownType {
        /// The offending type tag.
        msg_type: String,
    },

    /// `last_points_number` was zero.
    #[error("last_points_number must be at least 1")]
    ZeroCapacity,

    /// `last_points_number` exceeded the accepted maximum.
    #[error("last_points_number {requested} exceeds the limit of {limit}")]
    CapacityTooLarge {
        /// The value sent by the producer.
        requested: usize,
        /// The largest accepted value.
        limit: usize,
    },
}

/// Failure to turn a [`Message`](super::Message) into a payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A point holds NaN or infinity, which JSON cannot carry.
    #[error("point {index} has a non-finite coordinate")]
    NonFinite {
        /// Position of the point in the batch.
        index: usize,
    },

    /// JSON serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure to turn a payload into a [`Message`](super::Message).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is malformed; abort the connection.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The payload is well formed but not actionable; skip it.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Terminal failure of a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The byte stream could not be split into messages.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The transport failed (reset, broken pipe, ...).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ConnectionError {
    /// Check if this is an abrupt close by the peer rather than bad data.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Transport(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            Self::Framing(FramingError::Truncated { .. }) => true,
            Self::Framing(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_error_display() {
        let err = FramingError::TooLarge {
            size: 100,
            limit: 10,
        };
        assert_eq!(err.to_string(), "payload size 100 exceeds limit 10");

        let err = FramingError::malformed("missing msg_type");
        assert_eq!(err.to_string(), "malformed payload: missing msg_type");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownType {
            msg_type: "telemetry".to_string(),
        };
        assert!(err.to_string().contains("\"telemetry\""));
    }

    #[test]
    fn test_decode_error_is_transparent() {
        let err: DecodeError = ProtocolError::ZeroCapacity.into();
        assert_eq!(err.to_string(), "last_points_number must be at least 1");
    }

    #[test]
    fn test_connection_error_is_disconnect() {
        let reset = ConnectionError::Transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(reset.is_disconnect());

        let truncated = ConnectionError::Framing(FramingError::Truncated {
            expected: 64,
            received: 10,
        });
        assert!(truncated.is_disconnect());

        let bad = ConnectionError::Framing(FramingError::InvalidHeader {
            header: "x".to_string(),
        });
        assert!(!bad.is_disconnect());
    }
}
