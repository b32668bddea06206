//! Parcel - the marshalling buffer handed to and returned from handlers.
//!
//! A parcel keeps two cursors over one byte region:
//!
//! ```text
//!   consumed        remaining (size)
//! ├───────────┼──────────────────────────┤
//! 0          head                       tail
//! ```
//!
//! Appends grow the tail, reads and skips advance the head. Typed integers
//! are big-endian.
//!
//! # Example
//!
//! ```
//! use parcelwire::Parcel;
//!
//! let mut parcel = Parcel::new();
//! parcel.append_u32(7).unwrap();
//! parcel.append(b"tts\0").unwrap();
//!
//! assert_eq!(parcel.read_u32().unwrap(), 7);
//! assert_eq!(parcel.data(), b"tts\0");
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::MsgPackCodec;
use crate::error::{IpcError, Result};

/// Growable byte container with independent write-tail and read-head cursors.
#[derive(Clone, Default)]
pub struct Parcel {
    /// Backing storage; `buf.len()` is the tail.
    buf: BytesMut,
    /// Read cursor, always `<= buf.len()`.
    head: usize,
    /// Maximum number of remaining bytes, if bounded.
    limit: Option<usize>,
}

impl Parcel {
    /// Create an empty, unbounded parcel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty parcel with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            head: 0,
            limit: None,
        }
    }

    /// Create an empty parcel that never holds more than `limit` bytes.
    ///
    /// Appends that would overflow the limit fail with [`IpcError::Resource`].
    pub fn bounded(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit),
            head: 0,
            limit: Some(limit),
        }
    }

    /// Append raw bytes at the tail.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.reserve_room(data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Append a big-endian u16.
    pub fn append_u16(&mut self, val: u16) -> Result<()> {
        self.reserve_room(2)?;
        self.buf.put_u16(val);
        Ok(())
    }

    /// Append a big-endian u32.
    pub fn append_u32(&mut self, val: u32) -> Result<()> {
        self.reserve_room(4)?;
        self.buf.put_u32(val);
        Ok(())
    }

    /// Append a big-endian u64.
    pub fn append_u64(&mut self, val: u64) -> Result<()> {
        self.reserve_room(8)?;
        self.buf.put_u64(val);
        Ok(())
    }

    /// Append a MsgPack-encoded value.
    pub fn append_msgpack<T: serde::Serialize>(&mut self, value: &T) -> Result<()> {
        let encoded = MsgPackCodec::encode(value)?;
        self.append(&encoded)
    }

    /// Bytes between the head and the tail.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    /// Advance the head by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_remaining(n)?;
        self.head += n;
        Ok(())
    }

    /// Read a big-endian u16 from the head.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure_remaining(2)?;
        let val = (&self.buf[self.head..]).get_u16();
        self.head += 2;
        Ok(val)
    }

    /// Read a big-endian u32 from the head.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure_remaining(4)?;
        let val = (&self.buf[self.head..]).get_u32();
        self.head += 4;
        Ok(val)
    }

    /// Read a big-endian u64 from the head.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure_remaining(8)?;
        let val = (&self.buf[self.head..]).get_u64();
        self.head += 8;
        Ok(val)
    }

    /// Read one MsgPack value from the head, consuming exactly its encoding.
    pub fn read_msgpack<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let (value, used) = MsgPackCodec::decode_prefix(self.data())?;
        self.head += used;
        Ok(value)
    }

    /// Remaining length (tail - head).
    #[inline]
    pub fn size(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Whether no bytes remain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Bytes that can still be appended before hitting the limit.
    pub fn capacity_remaining(&self) -> usize {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.size()),
            None => usize::MAX,
        }
    }

    /// Reset to empty, retaining allocated capacity.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
    }

    /// Copy the remaining bytes into a vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data().to_vec()
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if n > self.size() {
            return Err(IpcError::InvalidArgument(format!(
                "parcel holds {} bytes, {} requested",
                self.size(),
                n
            )));
        }
        Ok(())
    }

    fn reserve_room(&mut self, n: usize) -> Result<()> {
        if n > self.capacity_remaining() {
            return Err(IpcError::Resource(format!(
                "parcel limit reached: {} bytes free, {} requested",
                self.capacity_remaining(),
                n
            )));
        }

        // Reclaim consumed bytes before growing the tail.
        if self.head > 0 {
            self.buf.advance(self.head);
            self.head = 0;
        }

        self.buf.reserve(n);
        Ok(())
    }
}

impl std::fmt::Debug for Parcel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parcel")
            .field("size", &self.size())
            .field("head", &self.head)
            .field("limit", &self.limit)
            .finish()
    }
}

impl AsRef<[u8]> for Parcel {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl From<&[u8]> for Parcel {
    fn from(data: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(data),
            head: 0,
            limit: None,
        }
    }
}

impl From<Vec<u8>> for Parcel {
    fn from(data: Vec<u8>) -> Self {
        Self::from(&data[..])
    }
}

impl From<&str> for Parcel {
    fn from(data: &str) -> Self {
        Self::from(data.as_bytes())
    }
}
