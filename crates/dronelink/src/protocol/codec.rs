//! Length-header framing.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{ConnectionError, FramingError};

/// Size of the ASCII length header that precedes every payload.
pub const HEADER_LEN: usize = 64;

/// Default upper bound on a single payload (16MB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUFFER_SIZE: usize = 8 * 1024;

/// Encode a payload length as a space-padded 64-byte header.
#[must_use]
pub fn encode_header(length: usize) -> [u8; HEADER_LEN] {
    let mut header = [b' '; HEADER_LEN];
    let digits = length.to_string();
    // usize never needs more than 20 digits
    header[..digits.len()].copy_from_slice(digits.as_bytes());
    header
}

/// Parse a 64-byte header back into a payload length.
///
/// Surrounding ASCII whitespace is ignored.
///
/// # Errors
///
/// Returns [`FramingError::InvalidHeader`] if `header` is not exactly
/// [`HEADER_LEN`] bytes or does not hold a non-negative decimal integer.
pub fn decode_header(header: &[u8]) -> Result<usize, FramingError> {
    let invalid = || FramingError::InvalidHeader {
        header: String::from_utf8_lossy(header).trim().to_string(),
    };

    if header.len() != HEADER_LEN {
        return Err(invalid());
    }

    let text = std::str::from_utf8(header).map_err(|_| invalid())?.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    text.parse().map_err(|_| invalid())
}

/// Prepend the length header to `payload`.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&encode_header(payload.len()));
    frame.extend_from_slice(payload);
    frame
}

/// Splits a byte stream into length-delimited payloads.
///
/// A payload is only returned once the header and all `length` bytes after
/// it have been buffered.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_payload: usize,
}

impl<R> FrameReader<R> {
    /// Wrap a reader using [`DEFAULT_MAX_PAYLOAD`].
    pub fn new(inner: R) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    /// Wrap a reader with a custom payload size limit.
    pub fn with_max_payload(inner: R, max_payload: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_payload,
        }
    }

    /// Mutable access to the underlying transport.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Number of bytes read but not yet returned as a payload.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Peek at the next payload length without consuming the buffer.
    ///
    /// Returns `Ok(None)` while the header is incomplete.
    fn peek_payload_len(&self) -> Result<Option<usize>, FramingError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = decode_header(&self.buf[..HEADER_LEN])?;
        if len > self.max_payload {
            return Err(FramingError::TooLarge {
                size: len,
                limit: self.max_payload,
            });
        }
        Ok(Some(len))
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next complete payload.
    ///
    /// Returns `Ok(None)` when the peer closes the stream on a frame
    /// boundary: no new header was started, so there is no message.
    ///
    /// # Errors
    ///
    /// Returns a framing error for a bad header, an oversized payload or a
    /// stream that ends mid-frame, and a transport error if the read fails.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        loop {
            let expected = match self.peek_payload_len()? {
                Some(len) => {
                    let total = HEADER_LEN + len;
                    if self.buf.len() >= total {
                        self.buf.advance(HEADER_LEN);
                        return Ok(Some(self.buf.split_to(len).freeze()));
                    }
                    self.buf.reserve(total - self.buf.len());
                    total
                }
                None => HEADER_LEN,
            };

            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FramingError::Truncated {
                    expected,
                    received: self.buf.len(),
                }
                .into());
            }
        }
    }
}
