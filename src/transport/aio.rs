//! Asynchronous operation slot.
//!
//! An [`Aio`] couples one socket with one completion callback. The driver
//! task issues the operation the callback asks for, waits for it, and hands
//! the outcome back to the callback, which answers with the next operation:
//!
//! ```text
//! callback(Started) ─► op ─► socket ─► completion ─► callback(event) ─► op ─► ...
//! ```
//!
//! Only one operation is ever outstanding, so the callback's state is owned
//! by the driver task and needs no lock. Returning `None` from the callback
//! parks the slot for good.
//!
//! # Example
//!
//! ```ignore
//! let aio = Aio::start(&reactor, "svc", socket, pump);
//! // ... completions flow on the reactor's worker threads ...
//! aio.stop();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::message::Message;
use super::reactor::Reactor;
use crate::error::Result;

/// Boxed future returned by socket operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operation a callback asks the driver to issue next.
#[derive(Debug)]
pub enum AioOp {
    /// Receive one message.
    Recv,
    /// Send one message.
    Send(Message),
}

/// Outcome delivered to a callback.
#[derive(Debug)]
pub enum AioEvent {
    /// The slot was just started; no operation has run yet.
    Started,
    /// A receive completed.
    Received(Result<Message>),
    /// A send completed.
    Sent(Result<()>),
}

/// Socket that can serve as the target of an aio slot.
pub trait AioSocket: Send + 'static {
    /// Receive one message, honouring the socket's receive timeout.
    fn recv(&mut self) -> BoxFuture<'_, Result<Message>>;

    /// Send one message, honouring the socket's send timeout.
    fn send(&mut self, msg: Message) -> BoxFuture<'_, Result<()>>;
}

/// Completion callback.
pub trait AioCallback: Send + 'static {
    /// Handle a completion and return the next operation, or `None` to stop.
    fn on_event(&mut self, event: AioEvent) -> Option<AioOp>;
}

/// Handle to a running aio slot.
///
/// Dropping the handle stops the slot.
pub struct Aio {
    name: Arc<str>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    reactor: Arc<Reactor>,
}

impl Aio {
    /// Start driving `callback` against `socket` on the reactor.
    pub fn start<S, C>(reactor: &Arc<Reactor>, name: &str, socket: S, callback: C) -> Self
    where
        S: AioSocket,
        C: AioCallback,
    {
        let name: Arc<str> = Arc::from(name);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = reactor.spawn(drive(Arc::clone(&name), socket, callback, stop_rx));

        Self {
            name,
            stop_tx: Some(stop_tx),
            task: Some(task),
            reactor: Arc::clone(reactor),
        }
    }

    /// Whether the driver is still issuing operations.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the slot and wait for the driver to exit.
    ///
    /// The in-flight operation is cancelled. A callback that is running when
    /// the stop arrives is allowed to return first. Calling `stop` again is a
    /// no-op.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let Some(task) = self.task.take() else {
            return;
        };

        if let Err(e) = self.reactor.block_on(async {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(context = %self.name, "pump panicked");
                }
            }
        }) {
            // Cannot wait here; the driver exits at its next suspension point.
            debug!(context = %self.name, "not waiting for pump: {}", e);
        }
    }
}

impl Drop for Aio {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive<S, C>(
    name: Arc<str>,
    mut socket: S,
    mut callback: C,
    mut stop_rx: oneshot::Receiver<()>,
) where
    S: AioSocket,
    C: AioCallback,
{
    let mut next = callback.on_event(AioEvent::Started);

    while let Some(op) = next {
        let event = tokio::select! {
            biased;
            _ = &mut stop_rx => {
                debug!(context = %name, "pump stop requested");
                return;
            }
            event = perform(&mut socket, op) => event,
        };
        next = callback.on_event(event);
    }

    debug!(context = %name, "pump dormant");
}

async fn perform<S: AioSocket>(socket: &mut S, op: AioOp) -> AioEvent {
    match op {
        AioOp::Recv => AioEvent::Received(socket.recv().await),
        AioOp::Send(msg) => AioEvent::Sent(socket.send(msg).await),
    }
}
