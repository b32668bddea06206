//! Synchronous transaction client.
//!
//! A [`Transactor`] sends one request at a time to a named server and
//! blocks until the reply arrives or the timeouts expire. Connecting never
//! waits for the server: if nobody listens on the name, transactions fail
//! with `-ETIMEDOUT`.
//!
//! # Example
//!
//! ```no_run
//! use parcelwire::{Parcel, Transactor};
//!
//! let mut client = Transactor::connect("media").unwrap();
//!
//! let mut request = Parcel::new();
//! request.append_u32(80).unwrap();
//! let mut reply = Parcel::bounded(64);
//!
//! let code = client.transact(2, Some(&request), Some(&mut reply));
//! if code < 0 {
//!     eprintln!("volume change failed: {}", code);
//! }
//! client.disconnect();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::Result;
use crate::parcel::Parcel;
use crate::protocol::Frame;
use crate::transport::{Address, Reactor, ReqSocket, Scheme, SocketOptions};

/// Builder for [`Transactor`].
pub struct TransactorBuilder {
    name: String,
    scheme: Scheme,
    options: SocketOptions,
    reactor: Option<Arc<Reactor>>,
}

impl TransactorBuilder {
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

    /// How long a request may wait for the server to take it.
    /// Default: 200 ms
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.options.send_timeout = timeout;
        self
    }

    /// How long to wait for the reply.
    /// Default: 200 ms
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.options.recv_timeout = timeout;
        self
    }

    /// Use a dedicated reactor instead of the global one.
    pub fn reactor(mut self, reactor: Arc<Reactor>) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Dial the server.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name.
    pub fn connect(self) -> Result<Transactor> {
        let address = Address::resolve(&self.name, self.scheme)?;
        let reactor = match self.reactor {
            Some(reactor) => reactor,
            None => Reactor::global()?,
        };
        let socket = ReqSocket::dial(address, self.options)?;

        debug!(client = %self.name, "transactor connected");
        Ok(Transactor {
            name: self.name,
            socket,
            reactor,
        })
    }
}

/// Client handle for one server. One transaction in flight at a time.
pub struct Transactor {
    name: String,
    socket: ReqSocket,
    reactor: Arc<Reactor>,
}

impl Transactor {
    /// Dial `name` with default timeouts.
    pub fn connect(name: &str) -> Result<Self> {
        Self::builder(name).connect()
    }

    /// Builder for custom timeouts, scheme or reactor.
    pub fn builder(name: &str) -> TransactorBuilder {
        TransactorBuilder::new(name)
    }

    /// Server name this client talks to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one transaction and return its status code.
    ///
    /// Returns the server's result code (0 on success) or a negative errno
    /// for local failures: `-ETIMEDOUT`, `-EPROTO` for a malformed reply,
    /// and so on. On failure `output` is left untouched. On success, at most
    /// `output.capacity_remaining()` reply bytes are appended to it.
    pub fn transact(
        &mut self,
        op_code: i32,
        input: Option<&Parcel>,
        output: Option<&mut Parcel>,
    ) -> i32 {
        match self.try_transact(op_code, input, output) {
            Ok(code) => code,
            Err(e) => {
                debug!(client = %self.name, op_code, "transaction failed: {}", e);
                e.code()
            }
        }
    }

    /// Like [`transact`](Self::transact), with local failures as errors.
    pub fn try_transact(
        &mut self,
        op_code: i32,
        input: Option<&Parcel>,
        output: Option<&mut Parcel>,
    ) -> Result<i32> {
        let reactor = Arc::clone(&self.reactor);
        reactor.block_on(self.transact_async(op_code, input, output))?
    }

    /// Async form for callers already running on a tokio runtime.
    pub async fn transact_async(
        &mut self,
        op_code: i32,
        input: Option<&Parcel>,
        output: Option<&mut Parcel>,
    ) -> Result<i32> {
        let payload = input.map(Parcel::data).unwrap_or(&[]);
        trace!(client = %self.name, op_code, len = payload.len(), "request");

        self.socket.send(Frame::request(op_code, payload)).await?;
        let reply = Frame::decode(self.socket.recv().await?)?;

        if let Some(output) = output {
            let n = output.capacity_remaining().min(reply.payload().len());
            output.append(&reply.payload()[..n])?;
        }

        trace!(client = %self.name, code = reply.op_code(), "reply");
        Ok(reply.op_code())
    }

    /// Close the connection.
    pub fn disconnect(self) {
        drop(self);
    }
}

impl Drop for Transactor {
    fn drop(&mut self) {
        debug!(client = %self.name, "transactor disconnected");
    }
}

impl std::fmt::Debug for Transactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transactor").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{errno, IpcError};
    use crate::server::{Reply, Server};

    fn fast(name: &str) -> Transactor {
        Transactor::builder(name)
            .send_timeout(Duration::from_millis(50))
            .recv_timeout(Duration::from_millis(50))
            .connect()
            .unwrap()
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            Transactor::connect(""),
            Err(IpcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_no_server_times_out() {
        let mut client = fast("client-test-nobody");
        let mut output = Parcel::from("keep");

        let code = client.transact(1, None, Some(&mut output));

        assert_eq!(code, -errno::ETIMEDOUT);
        assert_eq!(output.data(), b"keep");
    }

    #[test]
    fn test_output_copy_is_bounded() {
        let server = Server::create("client-test-bounded", |_op: i32, _req: &mut Parcel| {
            Reply::ok_with(Parcel::from("0123456789"))
        })
        .unwrap();

        let mut client = Transactor::connect("client-test-bounded").unwrap();
        let mut output = Parcel::bounded(4);
        assert_eq!(client.transact(1, None, Some(&mut output)), 0);
        assert_eq!(output.data(), b"0123");

        // No output parcel: only the code comes back.
        assert_eq!(client.transact(1, None, None), 0);
        server.release();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_transaction() {
        let server = Server::create("client-test-async", |op: i32, req: &mut Parcel| {
            let mut body = Parcel::new();
            body.append(req.data()).unwrap();
            body.append_u16(op as u16).unwrap();
            Reply::ok_with(body)
        })
        .unwrap();

        let mut client = Transactor::connect("client-test-async").unwrap();
        let mut output = Parcel::new();
        let code = client
            .transact_async(3, Some(&Parcel::from("ab")), Some(&mut output))
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(output.data(), &[b'a', b'b', 0, 3]);
        drop(client);
        server.release();
    }
}
