//! Error types for parcelwire.
//!
//! Every failure surfaces at the public boundary as a negative integer via
//! [`IpcError::code`], mirroring the errno convention used on the wire for
//! handler results.

use thiserror::Error;

/// Errno values used for result codes (Linux numbering).
pub mod errno {
    /// I/O error.
    pub const EIO: i32 = 5;
    /// Out of memory.
    pub const ENOMEM: i32 = 12;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Broken pipe.
    pub const EPIPE: i32 = 32;
    /// Protocol error.
    pub const EPROTO: i32 = 71;
    /// Operation not supported.
    pub const ENOTSUP: i32 = 95;
    /// Address already in use.
    pub const EADDRINUSE: i32 = 98;
    /// Connection timed out.
    pub const ETIMEDOUT: i32 = 110;
}

/// Main error type for all parcelwire operations.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Empty or malformed name, bad argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failure or a bounded parcel overflow.
    #[error("Resource exhausted: {0}")]
    Resource(String),

    /// Another socket is already listening on the address.
    #[error("Address in use: {0}")]
    AddressInUse(String),

    /// Scheme or operation not supported by this socket.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The peer or the local socket went away.
    #[error("Connection closed")]
    Closed,

    /// I/O error on a stream transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared length does not match the bytes on the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Send or receive did not complete within the configured timeout.
    #[error("Operation timed out")]
    Timeout,

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

impl IpcError {
    /// Negative result code reported at the call site.
    pub fn code(&self) -> i32 {
        match self {
            IpcError::InvalidArgument(_) => -errno::EINVAL,
            IpcError::Resource(_) => -errno::ENOMEM,
            IpcError::AddressInUse(_) => -errno::EADDRINUSE,
            IpcError::Unsupported(_) => -errno::ENOTSUP,
            IpcError::Closed => -errno::EPIPE,
            IpcError::Io(e) => -e.raw_os_error().filter(|c| *c > 0).unwrap_or(errno::EIO),
            IpcError::Protocol(_) => -errno::EPROTO,
            IpcError::Timeout => -errno::ETIMEDOUT,
            IpcError::MsgPackEncode(_) | IpcError::MsgPackDecode(_) => -errno::EINVAL,
        }
    }

    /// Whether this is a timeout, which pumps treat as a poll rather than a failure.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, IpcError::Timeout)
    }
}

/// Result type alias using IpcError.
pub type Result<T> = std::result::Result<T, IpcError>;
