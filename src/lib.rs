//! # parcelwire
//!
//! Named request/reply transactions and topic publish/subscribe on top of
//! an asynchronous message transport.
//!
//! ## Architecture
//!
//! - **Transactions**: a [`Server`] answers `(op_code, payload)` requests
//!   from [`Transactor`] clients with a result code and an optional body
//! - **Topics**: a [`Publisher`] fans envelopes out to every [`Subscriber`]
//!   whose registered prefix matches the 15-byte topic
//! - **Transport**: sockets run on a shared tokio reactor; names resolve to
//!   in-process, Unix socket (`ipc://`) or TCP endpoints
//!
//! Servers and subscribers are driven by a single in-flight operation whose
//! completion advances a small state machine. Handlers and listeners run on
//! reactor worker threads.
//!
//! ## Example
//!
//! ```
//! use parcelwire::{Parcel, Reply, Server, Transactor};
//!
//! let server = Server::create("lib-doc", |op: i32, request: &mut Parcel| {
//!     let value = match request.read_u32() {
//!         Ok(value) => value,
//!         Err(e) => return Reply::error(e.code()),
//!     };
//!     let mut body = Parcel::new();
//!     let _ = body.append_u32(value + op as u32);
//!     Reply::ok_with(body)
//! })
//! .unwrap();
//!
//! let mut client = Transactor::connect("lib-doc").unwrap();
//! let mut request = Parcel::new();
//! request.append_u32(40).unwrap();
//! let mut reply = Parcel::new();
//!
//! assert_eq!(client.transact(2, Some(&request), Some(&mut reply)), 0);
//! assert_eq!(reply.read_u32().unwrap(), 42);
//!
//! client.disconnect();
//! server.release();
//! ```

pub mod codec;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;
mod parcel;
mod publisher;
mod server;
mod subscriber;

pub use client::{Transactor, TransactorBuilder};
pub use error::{errno, IpcError, Result};
pub use parcel::Parcel;
pub use protocol::Topic;
pub use publisher::{Publisher, PublisherBuilder};
pub use server::{Reply, Server, ServerBuilder, TransactionHandler};
pub use subscriber::{Subscriber, SubscriberBuilder, TopicListener};
pub use transport::{Reactor, ReactorConfig, Scheme};
