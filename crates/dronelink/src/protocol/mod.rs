//! Wire protocol for drone telemetry.
//!
//! Every message on the wire is a fixed 64-byte ASCII length header followed
//! by exactly that many bytes of UTF-8 JSON:
//!
//! ```text
//! [64 bytes: decimal length, space padded][N bytes: {"msg_type": ..., ...}]
//! ```
//!
//! The message kind lives inside the payload (`msg_type`), never in the
//! header. Four kinds are recognized:
//!
//! | `msg_type`            | Meaning                                    |
//! |-----------------------|--------------------------------------------|
//! | `last_points_number`  | window capacity for subsequently seen drones |
//! | `coords`              | one batch of `{x, y, z}` points            |
//! | `END`                 | no more points for the consumer            |
//! | `!DISCONNECT`         | close this connection                      |
//!
//! # Example
//!
//! ```
//! use dronelink::protocol::{decode_header, encode_frame, HEADER_LEN};
//!
//! let frame = encode_frame(br#"{"msg_type":"END"}"#);
//! assert_eq!(frame.len(), HEADER_LEN + 18);
//! assert_eq!(decode_header(&frame[..HEADER_LEN]).unwrap(), 18);
//! ```

mod codec;
mod error;
mod message;

pub use codec::{decode_header, encode_frame, encode_header, FrameReader, DEFAULT_MAX_PAYLOAD, HEADER_LEN};
pub use error::{ConnectionError, DecodeError, EncodeError, FramingError, ProtocolError};
pub use message::{
    decode_message, encode_message, Message, PointRecord, MAX_LAST_POINTS, MSG_COORDS,
    MSG_DISCONNECT, MSG_END, MSG_LAST_POINTS,
};
