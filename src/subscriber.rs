//! Topic subscriber.
//!
//! A [`Subscriber`] dials a publisher and hands every matching envelope to
//! its [`TopicListener`]. Its pump only ever receives:
//!
//! ```text
//! InitRecv ─► RecvRetRecv ─► RecvRetRecv ─► ...
//! ```
//!
//! Nothing is delivered until at least one topic is registered. Filters
//! are byte prefixes of the 15-byte topic field, so registering `"audio"`
//! receives `"audio"` and `"audio/in"` alike, and registering `""`
//! receives everything.
//!
//! # Example
//!
//! ```
//! use parcelwire::{Subscriber, Topic};
//!
//! let subscriber = Subscriber::connect("doc-events", |topic: &Topic, content: &[u8]| {
//!     println!("{}: {} bytes", topic, content.len());
//! })
//! .unwrap();
//!
//! subscriber.register_topic("volume").unwrap();
//! subscriber.disconnect();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::error::{IpcError, Result};
use crate::protocol::{Envelope, Topic};
use crate::transport::{
    Address, Aio, AioCallback, AioEvent, AioOp, Message, Reactor, Scheme, SocketOptions,
    SubSocket, Subscriptions,
};

/// Receives published content.
///
/// Called on a reactor worker thread, one message at a time. `content` is
/// only valid for the duration of the call.
pub trait TopicListener: Send + 'static {
    /// Handle one message published under `topic`.
    fn on_topic(&mut self, topic: &Topic, content: &[u8]);
}

impl<F> TopicListener for F
where
    F: FnMut(&Topic, &[u8]) + Send + 'static,
{
    fn on_topic(&mut self, topic: &Topic, content: &[u8]) {
        self(topic, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberState {
    InitRecv,
    RecvRetRecv,
}

/// Per-subscriber state machine, driven by the aio slot.
pub(crate) struct SubscriberPump<L> {
    name: Arc<str>,
    state: SubscriberState,
    listener: L,
}

impl<L: TopicListener> SubscriberPump<L> {
    pub(crate) fn new(name: &str, listener: L) -> Self {
        Self {
            name: Arc::from(name),
            state: SubscriberState::InitRecv,
            listener,
        }
    }

    fn init_recv(&mut self) -> Option<AioOp> {
        self.state = SubscriberState::RecvRetRecv;
        Some(AioOp::Recv)
    }

    fn recv_ret_recv(&mut self, received: Result<Message>) -> Option<AioOp> {
        match received {
            Ok(msg) => self.deliver(msg),
            Err(IpcError::Timeout) => {}
            Err(e) => {
                error!(subscriber = %self.name, "receive failed, subscriber stopped: {}", e);
                return None;
            }
        }
        Some(AioOp::Recv)
    }

    fn deliver(&mut self, msg: Message) {
        match Envelope::decode(msg) {
            Ok(envelope) => {
                trace!(
                    subscriber = %self.name,
                    topic = %envelope.topic(),
                    len = envelope.content().len(),
                    "topic received"
                );
                self.listener.on_topic(envelope.topic(), envelope.content());
            }
            Err(e) => warn!(subscriber = %self.name, "malformed envelope: {}", e),
        }
    }
}

impl<L: TopicListener> AioCallback for SubscriberPump<L> {
    fn on_event(&mut self, event: AioEvent) -> Option<AioOp> {
        match (self.state, event) {
            (SubscriberState::InitRecv, AioEvent::Started) => self.init_recv(),
            (SubscriberState::RecvRetRecv, AioEvent::Received(result)) => {
                self.recv_ret_recv(result)
            }
            (state, event) => {
                error!(subscriber = %self.name, ?state, ?event, "unexpected completion");
                None
            }
        }
    }
}

/// Builder for [`Subscriber`].
pub struct SubscriberBuilder {
    name: String,
    scheme: Scheme,
    options: SocketOptions,
    reactor: Option<Arc<Reactor>>,
}

impl SubscriberBuilder {
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

    /// How often the pump wakes up while idle.
    /// Default: 200 ms
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.options.recv_timeout = timeout;
        self
    }

    /// Messages buffered before the publisher starts dropping.
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

    /// Dial the publisher and start the pump.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name, `Unsupported` if the name is
    /// served by a transaction server.
    pub fn connect<L: TopicListener>(self, listener: L) -> Result<Subscriber> {
        let address = Address::resolve(&self.name, self.scheme)?;
        let reactor = match self.reactor {
            Some(reactor) => reactor,
            None => Reactor::global()?,
        };

        let subscriptions = Subscriptions::default();
        let socket = reactor.block_on(SubSocket::dial(
            &address,
            self.options,
            subscriptions.clone(),
        ))??;
        let aio = Aio::start(
            &reactor,
            &self.name,
            socket,
            SubscriberPump::new(&self.name, listener),
        );

        debug!(subscriber = %self.name, address = %address, "subscriber connected");
        Ok(Subscriber {
            name: self.name,
            subscriptions,
            aio,
        })
    }
}

/// A connected subscriber.
///
/// Dropping it (or calling [`disconnect`](Subscriber::disconnect)) stops
/// the pump, waiting for a running listener call to return.
pub struct Subscriber {
    name: String,
    subscriptions: Subscriptions,
    aio: Aio,
}

impl Subscriber {
    /// Dial `name` with default settings and deliver to `listener`.
    pub fn connect<L: TopicListener>(name: &str, listener: L) -> Result<Self> {
        Self::builder(name).connect(listener)
    }

    /// Builder for custom settings.
    pub fn builder(name: &str) -> SubscriberBuilder {
        SubscriberBuilder::new(name)
    }

    /// Publisher name this subscriber dialed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive topics starting with `prefix` (truncated to 15 bytes).
    pub fn register_topic(&self, prefix: &str) -> Result<()> {
        self.subscriptions.subscribe(&Topic::filter(prefix));
        debug!(subscriber = %self.name, prefix, "topic registered");
        Ok(())
    }

    /// Stop receiving topics starting with `prefix`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the prefix was not registered.
    pub fn unregister_topic(&self, prefix: &str) -> Result<()> {
        self.subscriptions.unsubscribe(&Topic::filter(prefix))?;
        debug!(subscriber = %self.name, prefix, "topic unregistered");
        Ok(())
    }

    /// Whether the pump is still receiving (false once it went dormant).
    pub fn is_running(&self) -> bool {
        self.aio.is_active()
    }

    /// Stop receiving and release the connection.
    pub fn disconnect(self) {
        drop(self);
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.aio.stop();
        debug!(subscriber = %self.name, "subscriber disconnected");
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.name)
            .field("topics", &self.subscriptions.len())
            .field("running", &self.is_running())
            .finish()
    }
}
