//! MsgPack codec using `rmp-serde`.
//!
//! Structs are encoded as maps (`to_vec_named`) so that payloads stay
//! readable by peers that do not share the Rust type definitions.
//!
//! # Example
//!
//! ```
//! use parcelwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Volume {
//!     stream: u32,
//!     level: u8,
//! }
//!
//! let msg = Volume { stream: 3, level: 80 };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Volume = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use std::io::Cursor;

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Decode the first MsgPack value in `bytes`.
    ///
    /// Returns the value and the number of bytes its encoding occupied, so
    /// several values can be read back to back from one buffer.
    pub fn decode_prefix<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<(T, usize)> {
        let mut cursor = Cursor::new(bytes);
        let value = rmp_serde::from_read(&mut cursor)?;
        Ok((value, cursor.position() as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IpcError;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct VoiceRequest {
        engine: String,
        rate: u16,
        muted: bool,
    }

    fn voice() -> VoiceRequest {
        VoiceRequest {
            engine: "tts".to_string(),
            rate: 16000,
            muted: false,
        }
    }

    #[test]
    fn test_request_struct_as_map() {
        let encoded = MsgPackCodec::encode(&voice()).unwrap();

        // fixmap with 3 entries, not fixarray (0x93)
        assert_eq!(encoded[0], 0x83);
        let decoded: VoiceRequest = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, voice());
    }

    #[test]
    fn test_missing_field_rejected() {
        #[derive(Serialize)]
        struct Partial {
            engine: &'static str,
        }

        let encoded = MsgPackCodec::encode(&Partial { engine: "tts" }).unwrap();
        let result: Result<VoiceRequest> = MsgPackCodec::decode(&encoded);
        assert!(matches!(result, Err(IpcError::MsgPackDecode(_))));
    }

    #[test]
    fn test_trailing_bytes_ignored_by_prefix_only() {
        let mut bytes = MsgPackCodec::encode(&voice()).unwrap();
        let len = bytes.len();
        bytes.push(0xc0);

        let (decoded, used): (VoiceRequest, usize) = MsgPackCodec::decode_prefix(&bytes).unwrap();
        assert_eq!(decoded, voice());
        assert_eq!(used, len);
    }

    #[test]
    fn test_decode_prefix_reports_consumed_length() {
        let mut bytes = MsgPackCodec::encode(&"first").unwrap();
        let first_len = bytes.len();
        bytes.extend(MsgPackCodec::encode(&7u8).unwrap());

        let (value, used): (String, usize) = MsgPackCodec::decode_prefix(&bytes).unwrap();
        assert_eq!(value, "first");
        assert_eq!(used, first_len);

        let (next, used_next): (u8, usize) = MsgPackCodec::decode_prefix(&bytes[used..]).unwrap();
        assert_eq!(next, 7);
        assert_eq!(used + used_next, bytes.len());
    }

    #[test]
    fn test_decode_prefix_truncated_input() {
        let bytes = MsgPackCodec::encode(&"a longer string value").unwrap();
        let result: Result<(String, usize)> = MsgPackCodec::decode_prefix(&bytes[..4]);
        assert!(result.is_err());
    }

    #[test]
    fn test_binary_payload() {
        let data: Vec<u8> = vec![0x01, 0x02, 0x03, 0x04, 0x05];
        let encoded = MsgPackCodec::encode(&serde_bytes::Bytes::new(&data)).unwrap();

        // bin8 format
        assert_eq!(encoded[0], 0xc4);

        let decoded: serde_bytes::ByteBuf = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), &data);
    }
}
