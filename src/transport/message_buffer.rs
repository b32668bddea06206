//! Message buffer for accumulating partial stream reads.
//!
//! Stream transports delimit messages with an 8-byte big-endian length
//! prefix:
//!
//! ```text
//! ┌──────────────┬─────────────────┐
//! │ Length       │ Body            │
//! │ 8 bytes u64BE│ Length bytes    │
//! └──────────────┴─────────────────┘
//! ```
//!
//! The buffer runs a small state machine over a single `BytesMut`:
//! - `WaitingForLength`: need at least 8 bytes
//! - `WaitingForBody`: prefix parsed, need N more body bytes

use bytes::{Buf, BytesMut};

use super::message::Message;
use crate::error::{IpcError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Default initial capacity of the read buffer.
const DEFAULT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForLength,
    WaitingForBody { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct MessageBuffer {
    buffer: BytesMut,
    state: State,
    max_message_size: usize,
}

impl MessageBuffer {
    /// Create a buffer that rejects messages larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            state: State::WaitingForLength,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial data stays buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if a length prefix exceeds the maximum message size.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Message>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(msg) = self.try_extract_one()? {
            messages.push(msg);
        }

        Ok(messages)
    }

    fn try_extract_one(&mut self) -> Result<Option<Message>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }

                    let length = self.buffer.get_u64();
                    let remaining = usize::try_from(length)
                        .ok()
                        .filter(|len| *len <= self.max_message_size)
                        .ok_or_else(|| {
                            IpcError::Protocol(format!(
                                "message size {} exceeds maximum {}",
                                length, self.max_message_size
                            ))
                        })?;

                    self.state = State::WaitingForBody { remaining };
                }

                State::WaitingForBody { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining);
                    self.state = State::WaitingForLength;
                    return Ok(Some(Message::from(body)));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned as messages.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

/// Length prefix for a message body.
#[inline]
pub fn length_prefix(len: usize) -> [u8; LENGTH_PREFIX_SIZE] {
    (len as u64).to_be_bytes()
}
