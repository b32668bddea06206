//! Topic envelopes: envelope header plus content in one message.
//!
//! The topic field leads the message, so subscribe filters match raw
//! message prefixes.

use super::topic::Topic;
use super::wire_format::{EnvelopeHeader, ENVELOPE_HEADER_SIZE};
use crate::error::{IpcError, Result};
use crate::transport::Message;

/// A validated published message.
#[derive(Debug, Clone)]
pub struct Envelope {
    topic: Topic,
    content: Message,
}

impl Envelope {
    /// Build the message published for `topic` with `content`.
    ///
    /// # Example
    ///
    /// ```
    /// use parcelwire::protocol::{Envelope, Topic};
    ///
    /// let msg = Envelope::build(&Topic::new("level"), b"\x50");
    /// let envelope = Envelope::decode(msg).unwrap();
    /// assert_eq!(envelope.topic().name(), b"level");
    /// assert_eq!(envelope.content(), b"\x50");
    /// ```
    pub fn build(topic: &Topic, content: &[u8]) -> Message {
        let header = EnvelopeHeader::new(*topic, content.len() as u64);
        let mut msg = Message::with_capacity(ENVELOPE_HEADER_SIZE + content.len());
        msg.append(&header.encode());
        msg.append(content);
        msg
    }

    /// Strip and validate the envelope header.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the message is too short or `content_len`
    /// disagrees with the remaining bytes.
    pub fn decode(mut msg: Message) -> Result<Self> {
        let header = EnvelopeHeader::decode(msg.body()).ok_or_else(|| {
            IpcError::Protocol(format!("envelope too short: {} bytes", msg.len()))
        })?;
        msg.trim(ENVELOPE_HEADER_SIZE)?;

        if header.content_len != msg.len() as u64 {
            return Err(IpcError::Protocol(format!(
                "envelope declares {} content bytes, {} present",
                header.content_len,
                msg.len()
            )));
        }

        Ok(Self {
            topic: header.topic,
            content: msg,
        })
    }

    /// Topic the content was published under.
    #[inline]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Content bytes.
    #[inline]
    pub fn content(&self) -> &[u8] {
        self.content.body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_leads_the_message() {
        let msg = Envelope::build(&Topic::new("audio/in"), b"pcm");
        assert!(msg.body().starts_with(b"audio/in\0"));
        assert_eq!(msg.len(), ENVELOPE_HEADER_SIZE + 3);
    }

    #[test]
    fn test_empty_content() {
        let envelope = Envelope::decode(Envelope::build(&Topic::new("ping"), &[])).unwrap();
        assert_eq!(envelope.topic(), &Topic::new("ping"));
        assert!(envelope.content().is_empty());
    }

    #[test]
    fn test_content_len_mismatch_rejected() {
        let mut msg = Envelope::build(&Topic::new("t"), b"abc");
        msg.append(b"extra");
        assert!(matches!(Envelope::decode(msg), Err(IpcError::Protocol(_))));

        let header = EnvelopeHeader::new(Topic::new("t"), 8);
        let mut short = Message::new();
        short.append(&header.encode());
        short.append(b"abc");
        assert!(matches!(Envelope::decode(short), Err(IpcError::Protocol(_))));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let msg = Message::from(&[0u8; 10][..]);
        assert!(matches!(Envelope::decode(msg), Err(IpcError::Protocol(_))));
    }
}
