//! Transaction server.
//!
//! A [`Server`] listens on a name and answers every request with the
//! result of its [`TransactionHandler`]. Requests are processed one at a
//! time by the server's pump:
//!
//! ```text
//! InitRecv ─► RecvRetSend ─► SendRetRecv ─► RecvRetSend ─► ...
//!   recv        handle+send     recv            handle+send
//! ```
//!
//! A receive timeout just re-arms the receive. Any other receive failure
//! leaves the server dormant. A malformed request is answered with
//! `-EINVAL` without reaching the handler.
//!
//! # Example
//!
//! ```
//! use parcelwire::{Parcel, Reply, Server, Transactor};
//!
//! let server = Server::create("doc-echo", |_op: i32, request: &mut Parcel| {
//!     Reply::ok_with(request.clone())
//! })
//! .unwrap();
//!
//! let mut client = Transactor::connect("doc-echo").unwrap();
//! let mut output = Parcel::new();
//! let code = client.transact(1, Some(&Parcel::from("hi")), Some(&mut output));
//!
//! assert_eq!(code, 0);
//! assert_eq!(output.data(), b"hi");
//! server.release();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::error::{errno, IpcError, Result};
use crate::parcel::Parcel;
use crate::protocol::{Frame, TransactionHeader};
use crate::transport::{
    Address, Aio, AioCallback, AioEvent, AioOp, Message, Reactor, RepSocket, Scheme,
    SocketOptions,
};

/// Handler result: a status code and an optional body.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// 0 on success, a negative errno otherwise.
    pub code: i32,
    /// Bytes returned to the caller.
    pub body: Option<Parcel>,
}

impl Reply {
    /// Success without a body.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Success with a body.
    pub fn ok_with(body: Parcel) -> Self {
        Self {
            code: 0,
            body: Some(body),
        }
    }

    /// Failure with `code` (conventionally a negative errno).
    pub fn error(code: i32) -> Self {
        Self { code, body: None }
    }
}

impl From<Result<Option<Parcel>>> for Reply {
    fn from(result: Result<Option<Parcel>>) -> Self {
        match result {
            Ok(body) => Self { code: 0, body },
            Err(e) => Self::error(e.code()),
        }
    }
}

/// Serves transactions for one server.
///
/// Called on a reactor worker thread, one request at a time. Implement it
/// on your own state type, or pass a closure.
pub trait TransactionHandler: Send + 'static {
    /// Handle one request. `request` holds the payload bytes.
    fn on_transaction(&mut self, op_code: i32, request: &mut Parcel) -> Reply;
}

impl<F> TransactionHandler for F
where
    F: FnMut(i32, &mut Parcel) -> Reply + Send + 'static,
{
    fn on_transaction(&mut self, op_code: i32, request: &mut Parcel) -> Reply {
        self(op_code, request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    InitRecv,
    RecvRetSend,
    SendRetRecv,
}

/// Per-server state machine, driven by the aio slot.
pub(crate) struct ServerPump<H> {
    name: Arc<str>,
    state: ServerState,
    handler: H,
}

impl<H: TransactionHandler> ServerPump<H> {
    pub(crate) fn new(name: &str, handler: H) -> Self {
        Self {
            name: Arc::from(name),
            state: ServerState::InitRecv,
            handler,
        }
    }

    fn init_recv(&mut self) -> Option<AioOp> {
        self.state = ServerState::RecvRetSend;
        Some(AioOp::Recv)
    }

    fn recv_ret_send(&mut self, received: Result<Message>) -> Option<AioOp> {
        let msg = match received {
            Ok(msg) => msg,
            Err(IpcError::Timeout) => return Some(AioOp::Recv),
            Err(e) => {
                error!(server = %self.name, "receive failed, server stopped: {}", e);
                return None;
            }
        };

        let reply = match Frame::decode(msg) {
            Ok(frame) => self.dispatch(&frame),
            Err(e) => {
                warn!(server = %self.name, "malformed request: {}", e);
                Frame::reply(&TransactionHeader::new(0, 0), -errno::EINVAL, &[])
            }
        };

        self.state = ServerState::SendRetRecv;
        Some(AioOp::Send(reply))
    }

    fn dispatch(&mut self, frame: &Frame) -> Message {
        let mut request = Parcel::from(frame.payload());
        trace!(
            server = %self.name,
            op_code = frame.op_code(),
            len = request.size(),
            "transaction"
        );

        let reply = self.handler.on_transaction(frame.op_code(), &mut request);
        let body = reply.body.as_ref().map(Parcel::data).unwrap_or(&[]);
        Frame::reply(frame.header(), reply.code, body)
    }

    fn send_ret_recv(&mut self, sent: Result<()>) -> Option<AioOp> {
        if let Err(e) = sent {
            warn!(server = %self.name, "reply dropped: {}", e);
        }
        self.state = ServerState::RecvRetSend;
        Some(AioOp::Recv)
    }
}

impl<H: TransactionHandler> AioCallback for ServerPump<H> {
    fn on_event(&mut self, event: AioEvent) -> Option<AioOp> {
        match (self.state, event) {
            (ServerState::InitRecv, AioEvent::Started) => self.init_recv(),
            (ServerState::RecvRetSend, AioEvent::Received(result)) => self.recv_ret_send(result),
            (ServerState::SendRetRecv, AioEvent::Sent(result)) => self.send_ret_recv(result),
            (state, event) => {
                error!(server = %self.name, ?state, ?event, "unexpected completion");
                None
            }
        }
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    name: String,
    scheme: Scheme,
    options: SocketOptions,
    reactor: Option<Arc<Reactor>>,
}

impl ServerBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scheme: Scheme::default(),
            options: SocketOptions::default(),
            reactor: None,
        }
    }

    /// Transport scheme for names without an explicit one.
    /// Default: `Scheme::Inproc`
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// How long a reply may take to reach a stream connection before the
    /// connection is dropped. Inproc replies never wait.
    /// Default: 200 ms
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.options.send_timeout = timeout;
        self
    }

    /// How often the pump wakes up while idle.
    /// Default: 200 ms
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.options.recv_timeout = timeout;
        self
    }

    /// Requests queued before senders wait.
    /// Default: 128
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.options.queue_depth = depth;
        self
    }

    /// Run the pump on a dedicated reactor instead of the global one.
    pub fn reactor(mut self, reactor: Arc<Reactor>) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Listen and start serving with `handler`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name, `AddressInUse` if the name is
    /// taken, or the transport error raised while listening.
    pub fn create<H: TransactionHandler>(self, handler: H) -> Result<Server> {
        let address = Address::resolve(&self.name, self.scheme)?;
        let reactor = match self.reactor {
            Some(reactor) => reactor,
            None => Reactor::global()?,
        };

        let socket = reactor.block_on(RepSocket::listen(&address, self.options))??;
        let address = socket.local_address().clone();
        let aio = Aio::start(&reactor, &self.name, socket, ServerPump::new(&self.name, handler));

        debug!(server = %self.name, address = %address, "server created");
        Ok(Server {
            name: self.name,
            address,
            aio,
        })
    }
}

/// A listening transaction server.
///
/// Dropping the server (or calling [`release`](Server::release)) stops the
/// pump, waits for an in-progress handler call to return, and stops
/// listening.
pub struct Server {
    name: String,
    address: Address,
    aio: Aio,
}

impl Server {
    /// Listen on `name` with default settings and serve with `handler`.
    pub fn create<H: TransactionHandler>(name: &str, handler: H) -> Result<Self> {
        Self::builder(name).create(handler)
    }

    /// Builder for custom timeouts, scheme or reactor.
    pub fn builder(name: &str) -> ServerBuilder {
        ServerBuilder::new(name)
    }

    /// Name the server listens on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the server listens on.
    ///
    /// For `tcp://host:0` this carries the port actually bound, so clients
    /// can dial `address().to_string()`.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Whether the pump is still serving (false once it went dormant).
    pub fn is_running(&self) -> bool {
        self.aio.is_active()
    }

    /// Stop serving and release the endpoint.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.aio.stop();
        debug!(server = %self.name, "server released");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("running", &self.is_running())
            .finish()
    }
}
