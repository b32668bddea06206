//! Transport message - one unit of delivery.
//!
//! Protocol layers build messages by appending at the tail and consume
//! them by trimming headers off the head. Backed by `bytes::BytesMut`, so
//! trimming never copies.

use bytes::{Bytes, BytesMut};

use crate::error::{IpcError, Result};

/// A byte message exchanged by sockets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    body: BytesMut,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty message with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            body: BytesMut::with_capacity(capacity),
        }
    }

    /// Append bytes at the tail.
    #[inline]
    pub fn append(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    /// Remove `n` bytes from the head.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the message is shorter than `n`.
    pub fn trim(&mut self, n: usize) -> Result<()> {
        if n > self.body.len() {
            return Err(IpcError::Protocol(format!(
                "cannot trim {} bytes from a {} byte message",
                n,
                self.body.len()
            )));
        }
        let _ = self.body.split_to(n);
        Ok(())
    }

    /// Raw body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body length.
    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Drop all bytes, keeping capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.body.clear();
    }

    /// Freeze into shareable bytes (cheap to clone for fan-out).
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.body.freeze()
    }
}

impl From<Bytes> for Message {
    /// Takes the buffer over without copying when `bytes` is its only
    /// handle; shared buffers (fan-out to several links) are copied.
    fn from(bytes: Bytes) -> Self {
        let body = bytes
            .try_into_mut()
            .unwrap_or_else(|shared| BytesMut::from(&shared[..]));
        Self { body }
    }
}

impl From<BytesMut> for Message {
    fn from(body: BytesMut) -> Self {
        Self { body }
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Self {
            body: BytesMut::from(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_trim() {
        let mut msg = Message::new();
        msg.append(b"header");
        msg.append(b"body");

        msg.trim(6).unwrap();
        assert_eq!(msg.body(), b"body");
        assert_eq!(msg.len(), 4);
    }

    #[test]
    fn test_trim_too_far() {
        let mut msg = Message::from(&b"abc"[..]);
        assert!(matches!(msg.trim(4), Err(IpcError::Protocol(_))));
        assert_eq!(msg.body(), b"abc");
    }

    #[test]
    fn test_clear_and_into_bytes() {
        let mut msg = Message::from(&b"abc"[..]);
        msg.clear();
        assert!(msg.is_empty());

        msg.append(b"xyz");
        assert_eq!(&msg.into_bytes()[..], b"xyz");
    }

    #[test]
    fn test_from_unique_bytes_reuses_buffer() {
        let bytes = Bytes::from(b"envelope".to_vec());
        let ptr = bytes.as_ptr();
        let msg = Message::from(bytes);
        assert_eq!(msg.body().as_ptr(), ptr);

        let shared = Bytes::from(b"fan-out".to_vec());
        let other = shared.clone();
        let msg = Message::from(shared);
        assert_eq!(msg.body(), b"fan-out");
        assert_ne!(msg.body().as_ptr(), other.as_ptr());
    }
}
