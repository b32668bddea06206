//! Fixed-width topic names.
//!
//! A topic occupies exactly 15 bytes on the wire: longer names are
//! truncated, shorter ones are padded with NUL bytes.

use std::borrow::Cow;
use std::fmt;

/// Width of the topic field in bytes.
pub const TOPIC_SIZE: usize = 15;

/// A topic as carried in an envelope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Topic([u8; TOPIC_SIZE]);

impl Topic {
    /// Build a topic from a name, truncating or NUL-padding to 15 bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use parcelwire::protocol::Topic;
    ///
    /// let topic = Topic::new("volume");
    /// assert_eq!(&topic.as_bytes()[..7], b"volume\0");
    /// assert_eq!(Topic::new("a-very-long-topic-name").name(), b"a-very-long-top");
    /// ```
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        let name = name.as_ref();
        let len = name.len().min(TOPIC_SIZE);
        let mut field = [0u8; TOPIC_SIZE];
        field[..len].copy_from_slice(&name[..len]);
        Self(field)
    }

    /// Wrap a raw wire field.
    #[inline]
    pub fn from_wire(field: [u8; TOPIC_SIZE]) -> Self {
        Self(field)
    }

    /// The full 15-byte field, padding included.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; TOPIC_SIZE] {
        &self.0
    }

    /// The name without trailing padding (up to the first NUL).
    pub fn name(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(TOPIC_SIZE);
        &self.0[..end]
    }

    /// The name as text, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name())
    }

    /// Filter bytes for a topic prefix: the prefix truncated to 15 bytes.
    ///
    /// Filters are not padded, so `"audio"` matches `"audio"` and `"audio/in"`.
    pub fn filter(prefix: impl AsRef<[u8]>) -> Vec<u8> {
        let prefix = prefix.as_ref();
        prefix[..prefix.len().min(TOPIC_SIZE)].to_vec()
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({:?})", self.to_string_lossy())
    }
}
