//! Topic publisher.
//!
//! Publishing is fire-and-forget: the envelope is offered to every
//! connected subscriber and the call returns at once. Subscribers whose
//! queue is full miss the message.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::parcel::Parcel;
use crate::protocol::{Envelope, Topic};
use crate::transport::{Address, PubSocket, Reactor, Scheme, SocketOptions};

/// Builder for [`Publisher`].
pub struct PublisherBuilder {
    name: String,
    scheme: Scheme,
    options: SocketOptions,
    reactor: Option<Arc<Reactor>>,
}

impl PublisherBuilder {
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

    /// How long a stream subscriber may stall a write before it is
    /// disconnected. Inproc subscribers never block the publisher.
    /// Default: 200 ms
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.options.send_timeout = timeout;
        self
    }

    /// Messages queued per subscriber connection before new ones are dropped.
    /// Default: 128
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.options.queue_depth = depth;
        self
    }

    /// Use a dedicated reactor instead of the global one.
    pub fn reactor(mut self, reactor: Arc<Reactor>) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Start listening for subscribers.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name, `AddressInUse` if the name is
    /// taken.
    pub fn create(self) -> Result<Publisher> {
        let address = Address::resolve(&self.name, self.scheme)?;
        let reactor = match self.reactor {
            Some(reactor) => reactor,
            None => Reactor::global()?,
        };
        let socket = reactor.block_on(PubSocket::listen(&address, self.options))??;

        debug!(publisher = %self.name, address = %address, "publisher created");
        Ok(Publisher {
            name: self.name,
            socket,
            _reactor: reactor,
        })
    }
}

/// Publishes envelopes on a name.
pub struct Publisher {
    name: String,
    socket: PubSocket,
    // Stream listeners run on this reactor.
    _reactor: Arc<Reactor>,
}

impl Publisher {
    /// Listen on `name` with default settings.
    pub fn create(name: &str) -> Result<Self> {
        Self::builder(name).create()
    }

    /// Builder for custom settings.
    pub fn builder(name: &str) -> PublisherBuilder {
        PublisherBuilder::new(name)
    }

    /// Name the publisher listens on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the publisher listens on, with the real port for TCP port 0.
    pub fn address(&self) -> &Address {
        self.socket.local_address()
    }

    /// Publish the remaining bytes of `content` under `topic`. Failures are
    /// logged, not returned.
    ///
    /// The topic is truncated or NUL-padded to 15 bytes. `None` publishes an
    /// empty message.
    pub fn publish(&self, topic: &str, content: Option<&Parcel>) {
        if let Err(e) = self.try_publish(topic, content) {
            warn!(publisher = %self.name, topic, "publish failed: {}", e);
        }
    }

    /// Publish and report transport failures.
    pub fn try_publish(&self, topic: &str, content: Option<&Parcel>) -> Result<()> {
        let content = content.map(Parcel::data).unwrap_or(&[]);
        trace!(publisher = %self.name, topic, len = content.len(), "publish");
        self.socket.send(Envelope::build(&Topic::new(topic), content))
    }

    /// Number of subscriber connections currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.socket.subscriber_count()
    }

    /// Stop publishing and release the name.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        debug!(publisher = %self.name, "publisher released");
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("address", self.address())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
