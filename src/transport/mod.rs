//! Transport module - the message substrate under servers and topics.
//!
//! Provides:
//! - a shared [`Reactor`] whose worker threads deliver completions
//! - [`Address`] resolution for `inproc://`, `ipc://` and `tcp://`
//! - byte [`Message`]s and the four socket roles
//! - the [`Aio`] slot that drives a pump against a socket
//!
//! Stream schemes carry each message behind an 8-byte big-endian length
//! prefix, so a send is always received as exactly one message.

use std::time::Duration;

mod address;
mod aio;
mod inproc;
mod message;
mod message_buffer;
mod reactor;
mod socket;
mod stream;
mod writer;

pub use address::{Address, Scheme};
pub use aio::{Aio, AioCallback, AioEvent, AioOp, AioSocket, BoxFuture};
pub use message::Message;
pub use reactor::{Reactor, ReactorConfig, DEFAULT_THREAD_NAME, DEFAULT_WORKER_THREADS};
pub use socket::{PubSocket, RepSocket, ReqSocket, SubSocket, Subscriptions};

/// Default send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(200);

/// Default receive timeout.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Default per-socket queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 128;

/// Default maximum message size (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Per-socket options.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// How long a send may wait for the peer.
    pub send_timeout: Duration,
    /// How long a receive may wait before reporting a timeout.
    pub recv_timeout: Duration,
    /// Messages buffered per link before new ones are dropped or senders wait.
    pub queue_depth: usize,
    /// Largest message accepted from a stream.
    pub max_message_size: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
