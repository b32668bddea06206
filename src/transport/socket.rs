//! Socket roles: request, reply, publish and subscribe.
//!
//! | role          | listens/dials | send                         | recv                        |
//! |---------------|---------------|------------------------------|-----------------------------|
//! | [`ReqSocket`] | dials         | one request                  | the reply to that request   |
//! | [`RepSocket`] | listens       | the reply to the last recv   | next request                |
//! | [`PubSocket`] | listens       | fan-out, never blocks        | -                           |
//! | [`SubSocket`] | dials         | -                            | next message matching a filter |
//!
//! Dialing never waits for the peer. A request sent to a name nobody listens
//! on is retried until the send timeout; a subscriber keeps reconnecting in
//! the background.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace, warn};

use super::address::{Address, Scheme};
use super::aio::{AioSocket, BoxFuture};
use super::inproc::{self, Binding};
use super::message::Message;
use super::stream::{self, BoxedReader, BoxedWriter, MessageReader, SocketCleanup, StreamListener};
use super::writer::{spawn_writer_task, WriterHandle};
use super::SocketOptions;
use crate::error::{IpcError, Result};

/// Pause between attempts to reach a peer that is not listening yet.
const DIAL_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Pause between subscriber reconnects.
const REDIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// A request travelling to a reply socket, with the slot for its answer.
pub(crate) struct Request {
    pub(crate) body: Message,
    pub(crate) reply: oneshot::Sender<Message>,
}

/// Aborts a background task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// What keeps a listening socket reachable.
enum Listening {
    Inproc(#[allow(dead_code)] Binding),
    Stream {
        _accept: TaskGuard,
        _cleanup: Option<SocketCleanup>,
    },
}

impl Listening {
    /// Bind a stream listener and hand it to `serve`. Returns the address
    /// actually bound, which differs from `address` for TCP port 0.
    async fn stream<F, Fut>(address: &Address, serve: F) -> Result<(Self, Address)>
    where
        F: FnOnce(StreamListener) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = StreamListener::bind(address).await?;
        let bound = listener.local_address()?;
        let cleanup = listener.cleanup_guard();
        let accept = tokio::spawn(serve(listener));
        let listening = Listening::Stream {
            _accept: TaskGuard(accept),
            _cleanup: cleanup,
        };
        Ok((listening, bound))
    }
}

// ============================================================================
// Request
// ============================================================================

enum Outstanding {
    Idle,
    Inproc(oneshot::Receiver<Message>),
    Stream,
}

struct Connection {
    reader: MessageReader,
    writer: WriterHandle,
}

/// Request side of a request/reply pair.
pub struct ReqSocket {
    address: Address,
    options: SocketOptions,
    outstanding: Outstanding,
    connection: Option<Connection>,
}

impl ReqSocket {
    /// Dial `address`. Succeeds whether or not anything listens there yet.
    pub fn dial(address: Address, options: SocketOptions) -> Result<Self> {
        debug!(address = %address, "request socket dialing");
        Ok(Self {
            address,
            options,
            outstanding: Outstanding::Idle,
            connection: None,
        })
    }

    /// Send a request. Any earlier unanswered request is abandoned.
    ///
    /// # Errors
    ///
    /// `Timeout` if no listener took the request within the send timeout,
    /// `Unsupported` if the address belongs to another role.
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        self.outstanding = Outstanding::Idle;
        let deadline = Instant::now() + self.options.send_timeout;

        match self.address.scheme() {
            Scheme::Inproc => self.send_inproc(msg, deadline).await,
            Scheme::Ipc | Scheme::Tcp => self.send_stream(msg, deadline).await,
        }
    }

    async fn send_inproc(&mut self, mut msg: Message, deadline: Instant) -> Result<()> {
        loop {
            if let Some(requests) = inproc::lookup_reply(self.address.target())? {
                let (reply_tx, reply_rx) = oneshot::channel();
                let request = Request {
                    body: msg,
                    reply: reply_tx,
                };
                match timeout_at(deadline, requests.send(request)).await {
                    Ok(Ok(())) => {
                        self.outstanding = Outstanding::Inproc(reply_rx);
                        return Ok(());
                    }
                    // Listener went away between lookup and send.
                    Ok(Err(mpsc::error::SendError(request))) => msg = request.body,
                    Err(_) => return Err(IpcError::Timeout),
                }
            }

            retry_pause(deadline).await?;
        }
    }

    async fn send_stream(&mut self, msg: Message, deadline: Instant) -> Result<()> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect_until(deadline).await?,
        };

        match timeout_at(deadline, connection.writer.send(msg)).await {
            Ok(Ok(())) => {
                self.connection = Some(connection);
                self.outstanding = Outstanding::Stream;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(IpcError::Timeout),
        }
    }

    async fn connect_until(&self, deadline: Instant) -> Result<Connection> {
        loop {
            match timeout_at(deadline, stream::connect(&self.address)).await {
                Ok(Ok((reader, writer))) => return Ok(self.open_connection(reader, writer)),
                Ok(Err(e @ IpcError::Unsupported(_))) => return Err(e),
                Ok(Err(e)) => trace!(address = %self.address, "dial failed: {}", e),
                Err(_) => return Err(IpcError::Timeout),
            }

            retry_pause(deadline).await?;
        }
    }

    fn open_connection(&self, reader: BoxedReader, writer: BoxedWriter) -> Connection {
        let (writer, _task) =
            spawn_writer_task(writer, self.options.queue_depth, self.options.send_timeout);
        trace!(address = %self.address, "request connection established");
        Connection {
            reader: MessageReader::new(reader, self.options.max_message_size),
            writer,
        }
    }

    /// Receive the reply to the last request.
    ///
    /// # Errors
    ///
    /// `Timeout` after the receive timeout, `Closed` if the replier dropped
    /// the request, `InvalidArgument` if no request is outstanding.
    pub async fn recv(&mut self) -> Result<Message> {
        let recv_timeout = self.options.recv_timeout;

        match std::mem::replace(&mut self.outstanding, Outstanding::Idle) {
            Outstanding::Idle => Err(IpcError::InvalidArgument(
                "no request outstanding".to_string(),
            )),
            Outstanding::Inproc(reply) => match timeout(recv_timeout, reply).await {
                Ok(Ok(msg)) => Ok(msg),
                Ok(Err(_)) => Err(IpcError::Closed),
                Err(_) => Err(IpcError::Timeout),
            },
            Outstanding::Stream => {
                let Some(connection) = self.connection.as_mut() else {
                    return Err(IpcError::Closed);
                };
                let result = match timeout(recv_timeout, connection.reader.next()).await {
                    Ok(Ok(Some(msg))) => return Ok(msg),
                    Ok(Ok(None)) => Err(IpcError::Closed),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(IpcError::Timeout),
                };
                // A late reply would answer the wrong request; start afresh.
                self.connection = None;
                result
            }
        }
    }
}

async fn retry_pause(deadline: Instant) -> Result<()> {
    let now = Instant::now();
    if now >= deadline {
        return Err(IpcError::Timeout);
    }
    tokio::time::sleep_until(deadline.min(now + DIAL_RETRY_INTERVAL)).await;
    Ok(())
}

// ============================================================================
// Reply
// ============================================================================

/// Reply side of a request/reply pair.
pub struct RepSocket {
    requests: mpsc::Receiver<Request>,
    pending: Option<oneshot::Sender<Message>>,
    options: SocketOptions,
    local_address: Address,
    _listening: Listening,
}

impl RepSocket {
    /// Listen on `address`.
    ///
    /// # Errors
    ///
    /// `AddressInUse` if another socket already listens there.
    pub async fn listen(address: &Address, options: SocketOptions) -> Result<Self> {
        let (tx, requests) = mpsc::channel(options.queue_depth.max(1));

        let (listening, local_address) = match address.scheme() {
            Scheme::Inproc => (
                Listening::Inproc(inproc::bind_reply(address.target(), tx)?),
                address.clone(),
            ),
            Scheme::Ipc | Scheme::Tcp => {
                let conn_options = options.clone();
                Listening::stream(address, move |listener| {
                    accept_requests(listener, tx, conn_options)
                })
                .await?
            }
        };

        debug!(address = %local_address, "reply socket listening");
        Ok(Self {
            requests,
            pending: None,
            options,
            local_address,
            _listening: listening,
        })
    }

    /// Address the socket listens on, with the real port for TCP port 0.
    pub fn local_address(&self) -> &Address {
        &self.local_address
    }

    /// Receive the next request.
    pub async fn recv(&mut self) -> Result<Message> {
        match timeout(self.options.recv_timeout, self.requests.recv()).await {
            Ok(Some(request)) => {
                self.pending = Some(request.reply);
                Ok(request.body)
            }
            Ok(None) => Err(IpcError::Closed),
            Err(_) => Err(IpcError::Timeout),
        }
    }

    /// Answer the request returned by the last `recv`.
    ///
    /// # Errors
    ///
    /// `Protocol` if there is nothing to answer, `Closed` if the requester
    /// already gave up.
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        let reply = self
            .pending
            .take()
            .ok_or_else(|| IpcError::Protocol("no request to answer".to_string()))?;
        reply.send(msg).map_err(|_| IpcError::Closed)
    }
}

impl AioSocket for RepSocket {
    fn recv(&mut self) -> BoxFuture<'_, Result<Message>> {
        Box::pin(RepSocket::recv(self))
    }

    fn send(&mut self, msg: Message) -> BoxFuture<'_, Result<()>> {
        Box::pin(RepSocket::send(self, msg))
    }
}

async fn accept_requests(
    listener: StreamListener,
    requests: mpsc::Sender<Request>,
    options: SocketOptions,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((reader, writer)) => {
                    connections.spawn(serve_requests(
                        reader,
                        writer,
                        requests.clone(),
                        options.clone(),
                    ));
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = requests.closed() => break,
        }
    }
}

async fn serve_requests(
    reader: BoxedReader,
    writer: BoxedWriter,
    requests: mpsc::Sender<Request>,
    options: SocketOptions,
) {
    let mut reader = MessageReader::new(reader, options.max_message_size);
    let (writer, _task) = spawn_writer_task(writer, options.queue_depth, options.send_timeout);

    loop {
        let body = match reader.next().await {
            Ok(Some(body)) => body,
            Ok(None) => break,
            Err(e) => {
                debug!("request connection dropped: {}", e);
                break;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            body,
            reply: reply_tx,
        };
        if requests.send(request).await.is_err() {
            break;
        }

        // A dropped reply leaves the requester to time out.
        if let Ok(reply) = reply_rx.await {
            match timeout(options.send_timeout, writer.send(reply)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => break,
                Err(_) => {
                    warn!("reply not written within the send timeout, dropping connection");
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Publish
// ============================================================================

/// Fan-out point shared by a publish socket and its subscriber links.
#[derive(Default)]
pub(crate) struct Hub {
    links: Mutex<Vec<mpsc::Sender<Bytes>>>,
}

impl Hub {
    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::Sender<Bytes>>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber link.
    pub(crate) fn attach(&self, link: mpsc::Sender<Bytes>) {
        self.lock().push(link);
    }

    /// Offer `bytes` to every link without waiting.
    ///
    /// Full queues drop the message; closed links are pruned. Returns the
    /// number of links that accepted it.
    pub(crate) fn broadcast(&self, bytes: Bytes) -> usize {
        let mut delivered = 0;
        self.lock().retain(|link| match link.try_send(bytes.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                trace!("subscriber queue full, message dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    /// Detach and return every link.
    pub(crate) fn take_links(&self) -> Vec<mpsc::Sender<Bytes>> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of attached links.
    pub(crate) fn link_count(&self) -> usize {
        self.lock().len()
    }
}

/// Publish socket.
pub struct PubSocket {
    hub: Arc<Hub>,
    local_address: Address,
    _listening: Listening,
}

impl PubSocket {
    /// Listen on `address`.
    pub async fn listen(address: &Address, options: SocketOptions) -> Result<Self> {
        let hub = Arc::new(Hub::default());

        let (listening, local_address) = match address.scheme() {
            Scheme::Inproc => (
                Listening::Inproc(inproc::bind_publish(address.target(), Arc::clone(&hub))?),
                address.clone(),
            ),
            Scheme::Ipc | Scheme::Tcp => {
                let accept_hub = Arc::clone(&hub);
                Listening::stream(address, move |listener| {
                    accept_subscribers(listener, accept_hub, options)
                })
                .await?
            }
        };

        debug!(address = %local_address, "publish socket listening");
        Ok(Self {
            hub,
            local_address,
            _listening: listening,
        })
    }

    /// Address the socket listens on, with the real port for TCP port 0.
    pub fn local_address(&self) -> &Address {
        &self.local_address
    }

    /// Offer a message to every connected subscriber. Never blocks.
    pub fn send(&self, msg: Message) -> Result<()> {
        let delivered = self.hub.broadcast(msg.into_bytes());
        trace!(delivered, "message published");
        Ok(())
    }

    /// Number of subscriber links currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.hub.link_count()
    }
}

async fn accept_subscribers(listener: StreamListener, hub: Arc<Hub>, options: SocketOptions) {
    loop {
        match listener.accept().await {
            Ok((_reader, writer)) => {
                let (writer, _task) =
                    spawn_writer_task(writer, options.queue_depth, options.send_timeout);
                hub.attach(writer.link());
                trace!("subscriber connected");
            }
            Err(e) => {
                warn!("accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

// ============================================================================
// Subscribe
// ============================================================================

/// Topic filters shared between a subscriber handle and its socket.
///
/// A message is delivered if its first bytes equal any registered filter.
/// With no filters nothing is delivered.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    filters: Arc<RwLock<Vec<Vec<u8>>>>,
}

impl Subscriptions {
    /// Add a filter. Adding an existing filter is a no-op.
    pub fn subscribe(&self, prefix: &[u8]) {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        if !filters.iter().any(|f| f == prefix) {
            filters.push(prefix.to_vec());
        }
    }

    /// Remove a filter.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the filter was never added.
    pub fn unsubscribe(&self, prefix: &[u8]) -> Result<()> {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        let index = filters
            .iter()
            .position(|f| f == prefix)
            .ok_or_else(|| IpcError::InvalidArgument("topic filter not registered".to_string()))?;
        filters.swap_remove(index);
        Ok(())
    }

    /// Whether `msg` passes at least one filter.
    pub fn matches(&self, msg: &[u8]) -> bool {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|f| msg.starts_with(f))
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no filter is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subscribe socket.
pub struct SubSocket {
    inbox: mpsc::Receiver<Bytes>,
    subscriptions: Subscriptions,
    options: SocketOptions,
    _dialer: Option<TaskGuard>,
}

impl SubSocket {
    /// Dial the publisher at `address`, filtering with `subscriptions`.
    pub async fn dial(
        address: &Address,
        options: SocketOptions,
        subscriptions: Subscriptions,
    ) -> Result<Self> {
        let (link, inbox) = mpsc::channel(options.queue_depth.max(1));

        let dialer = match address.scheme() {
            Scheme::Inproc => {
                inproc::dial_subscriber(address.target(), link)?;
                None
            }
            Scheme::Ipc | Scheme::Tcp => Some(TaskGuard(tokio::spawn(dial_publisher(
                address.clone(),
                link,
                options.clone(),
            )))),
        };

        debug!(address = %address, "subscribe socket dialing");
        Ok(Self {
            inbox,
            subscriptions,
            options,
            _dialer: dialer,
        })
    }

    /// Receive the next message that passes the filters.
    pub async fn recv(&mut self) -> Result<Message> {
        let deadline = Instant::now() + self.options.recv_timeout;

        loop {
            match timeout_at(deadline, self.inbox.recv()).await {
                Ok(Some(bytes)) => {
                    if self.subscriptions.matches(&bytes) {
                        return Ok(Message::from(bytes));
                    }
                    trace!("message filtered out");
                }
                Ok(None) => return Err(IpcError::Closed),
                Err(_) => return Err(IpcError::Timeout),
            }
        }
    }
}

impl AioSocket for SubSocket {
    fn recv(&mut self) -> BoxFuture<'_, Result<Message>> {
        Box::pin(SubSocket::recv(self))
    }

    fn send(&mut self, _msg: Message) -> BoxFuture<'_, Result<()>> {
        Box::pin(async {
            Err(IpcError::Unsupported(
                "subscribe sockets cannot send".to_string(),
            ))
        })
    }
}

async fn dial_publisher(address: Address, link: mpsc::Sender<Bytes>, options: SocketOptions) {
    while !link.is_closed() {
        match stream::connect(&address).await {
            Ok((reader, _writer)) => {
                trace!(address = %address, "subscriber connected");
                let mut reader = MessageReader::new(reader, options.max_message_size);
                loop {
                    match reader.next().await {
                        Ok(Some(msg)) => {
                            if link.send(msg.into_bytes()).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!(address = %address, "publisher connection dropped: {}", e);
                            break;
                        }
                    }
                }
            }
            Err(e) => trace!(address = %address, "publisher not reachable: {}", e),
        }

        tokio::time::sleep(REDIAL_INTERVAL).await;
    }
}
