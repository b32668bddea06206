//! Wire format encoding and decoding.
//!
//! Transaction header (16 bytes):
//! ```text
//! ┌──────────┬──────────┬──────────────┐
//! │ Seq      │ Op code  │ Length       │
//! │ 4 bytes  │ 4 bytes  │ 8 bytes      │
//! │ i32      │ i32      │ u64          │
//! └──────────┴──────────┴──────────────┘
//! ```
//!
//! Envelope header (24 bytes):
//! ```text
//! ┌──────────────────┬───────┬──────────────┐
//! │ Topic            │ NUL   │ Content len  │
//! │ 15 bytes         │ 1 byte│ 8 bytes u64  │
//! └──────────────────┴───────┴──────────────┘
//! ```
//!
//! Integers use the host's native byte order; both ends of a link are
//! expected to share an architecture.

use super::topic::{Topic, TOPIC_SIZE};

/// Transaction header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Envelope header size in bytes.
pub const ENVELOPE_HEADER_SIZE: usize = 24;

/// Prefix of every request and reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHeader {
    /// Reserved; written as 0 and echoed back.
    pub seq: i32,
    /// Command on the way in, result code on the way back.
    pub op_code: i32,
    /// Number of payload bytes following the header.
    pub length: u64,
}

impl TransactionHeader {
    /// Create a header with `seq = 0`.
    pub fn new(op_code: i32, length: u64) -> Self {
        Self {
            seq: 0,
            op_code,
            length,
        }
    }

    /// Encode to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use parcelwire::protocol::{TransactionHeader, HEADER_SIZE};
    ///
    /// let header = TransactionHeader::new(3, 5);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(TransactionHeader::decode(&bytes), Some(header));
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.seq.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.op_code.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.length.to_ne_bytes());
        buf
    }

    /// Decode from the first 16 bytes of `buf`.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            seq: i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            op_code: i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
            length: u64::from_ne_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
        })
    }
}

/// Prefix of every published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Fixed-width topic.
    pub topic: Topic,
    /// Number of content bytes following the header.
    pub content_len: u64,
}

impl EnvelopeHeader {
    /// Create an envelope header.
    pub fn new(topic: Topic, content_len: u64) -> Self {
        Self { topic, content_len }
    }

    /// Encode to bytes; byte 15 is always NUL.
    pub fn encode(&self) -> [u8; ENVELOPE_HEADER_SIZE] {
        let mut buf = [0u8; ENVELOPE_HEADER_SIZE];
        buf[..TOPIC_SIZE].copy_from_slice(self.topic.as_bytes());
        buf[16..24].copy_from_slice(&self.content_len.to_ne_bytes());
        buf
    }

    /// Decode from the first 24 bytes of `buf`.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf: &[u8; ENVELOPE_HEADER_SIZE] = buf.get(..ENVELOPE_HEADER_SIZE)?.try_into().ok()?;
        let mut topic = [0u8; TOPIC_SIZE];
        topic.copy_from_slice(&buf[..TOPIC_SIZE]);
        let mut len = [0u8; 8];
        len.copy_from_slice(&buf[16..24]);
        Some(Self {
            topic: Topic::from_wire(topic),
            content_len: u64::from_ne_bytes(len),
        })
    }
}
