//! Transaction frames: header plus payload in one message.
//!
//! # Example
//!
//! ```
//! use parcelwire::protocol::Frame;
//!
//! let msg = Frame::request(7, b"hello");
//! let frame = Frame::decode(msg).unwrap();
//!
//! assert_eq!(frame.op_code(), 7);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use super::wire_format::{TransactionHeader, HEADER_SIZE};
use crate::error::{IpcError, Result};
use crate::transport::Message;

/// A validated transaction frame.
#[derive(Debug, Clone)]
pub struct Frame {
    header: TransactionHeader,
    payload: Message,
}

impl Frame {
    /// Build a request message for `op_code` carrying `payload`.
    pub fn request(op_code: i32, payload: &[u8]) -> Message {
        build_frame(&TransactionHeader::new(op_code, payload.len() as u64), payload)
    }

    /// Build the reply to `request`: same header with the result code and
    /// the reply body's length.
    pub fn reply(request: &TransactionHeader, code: i32, body: &[u8]) -> Message {
        let header = TransactionHeader {
            op_code: code,
            length: body.len() as u64,
            ..*request
        };
        build_frame(&header, body)
    }

    /// Strip and validate the header of a received message.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the message is shorter than a header or the
    /// declared length differs from the bytes that follow it.
    pub fn decode(mut msg: Message) -> Result<Self> {
        let header = TransactionHeader::decode(msg.body()).ok_or_else(|| {
            IpcError::Protocol(format!(
                "message of {} bytes cannot hold a {} byte header",
                msg.len(),
                HEADER_SIZE
            ))
        })?;
        msg.trim(HEADER_SIZE)?;

        if header.length != msg.len() as u64 {
            return Err(IpcError::Protocol(format!(
                "header declares {} payload bytes, {} present",
                header.length,
                msg.len()
            )));
        }

        Ok(Self {
            header,
            payload: msg,
        })
    }

    /// Decoded header.
    #[inline]
    pub fn header(&self) -> &TransactionHeader {
        &self.header
    }

    /// Command (request) or result code (reply).
    #[inline]
    pub fn op_code(&self) -> i32 {
        self.header.op_code
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        self.payload.body()
    }
}

/// Encode `header` followed by `payload` into one message.
pub fn build_frame(header: &TransactionHeader, payload: &[u8]) -> Message {
    let mut msg = Message::with_capacity(HEADER_SIZE + payload.len());
    msg.append(&header.encode());
    msg.append(payload);
    msg
}
