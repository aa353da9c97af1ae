//! IRC message codec for tokio.
//!
//! Frames the byte stream into CRLF-terminated lines and parses each line
//! into a [`Message`]. Lines that fail to parse are skipped; only an
//! oversized line is an error. Outgoing messages get their CRLF appended here.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, ProtocolError};
use crate::message::Message;

/// Upper bound for a single received line, tags included.
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// Tokio codec for encoding/decoding IRC messages.
pub struct IrcCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
}

impl IrcCodec {
    /// Codec with the default line limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_IRC_LINE_LEN)
    }

    /// Codec with a custom line limit in bytes.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }

    /// Cut an outgoing line at its first line break and reject NUL.
    pub fn sanitize(mut data: String) -> error::Result<String> {
        if let Some(pos) = data.find(&['\r', '\n'][..]) {
            data.truncate(pos);
        }
        if data.contains('\0') {
            return Err(ProtocolError::IllegalControlChar('\0'));
        }
        Ok(data)
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_len {
                    return Err(ProtocolError::MessageTooLong {
                        actual: src.len(),
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            // Non-UTF-8 bytes show up on real networks; keep what we can.
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(&['\r', '\n'][..]);

            // Servers occasionally send blank keepalive lines.
            if text.trim().is_empty() {
                continue;
            }

            // A line we cannot parse is dropped rather than ending the stream.
            match text.parse::<Message>() {
                Ok(msg) => return Ok(Some(msg)),
                Err(_) => continue,
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        let line = Self::sanitize(msg.to_string())?;
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
