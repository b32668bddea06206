//! In-process address registry.
//!
//! `inproc://` names live in one process-wide table. Listeners register
//! their endpoint there; dialers look it up. Subscribers may dial before
//! their publisher exists: their links wait in the table and are adopted
//! when a publisher binds the name, and handed back when it goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::socket::{Hub, Request};
use crate::error::{IpcError, Result};

enum Endpoint {
    Reply(mpsc::Sender<Request>),
    Publish(Arc<Hub>),
    Subscribers(Vec<mpsc::Sender<Bytes>>),
}

impl Endpoint {
    /// Parked subscribers that have all gone away.
    fn is_stale(&self) -> bool {
        matches!(self, Endpoint::Subscribers(pending) if pending.iter().all(|tx| tx.is_closed()))
    }

    fn role(&self) -> &'static str {
        match self {
            Endpoint::Reply(_) => "reply",
            Endpoint::Publish(_) => "publish",
            Endpoint::Subscribers(_) => "subscribe",
        }
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Endpoint>>> = OnceLock::new();

fn registry() -> MutexGuard<'static, HashMap<String, Endpoint>> {
    REGISTRY
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Forget names whose parked subscribers have all gone away.
fn sweep_stale(registry: &mut HashMap<String, Endpoint>) {
    let before = registry.len();
    registry.retain(|_, endpoint| !endpoint.is_stale());
    if registry.len() < before {
        trace!(swept = before - registry.len(), "stale inproc names removed");
    }
}

/// Registration of a listening endpoint; unregisters on drop.
#[derive(Debug)]
pub(crate) struct Binding {
    name: String,
}

impl Drop for Binding {
    fn drop(&mut self) {
        let mut registry = registry();
        match registry.remove(&self.name) {
            Some(Endpoint::Publish(hub)) => {
                let links = hub.take_links();
                if !links.is_empty() {
                    trace!(name = %self.name, links = links.len(), "subscribers parked");
                    registry.insert(self.name.clone(), Endpoint::Subscribers(links));
                }
            }
            Some(Endpoint::Subscribers(pending)) => {
                // Not ours; put it back.
                registry.insert(self.name.clone(), Endpoint::Subscribers(pending));
            }
            Some(Endpoint::Reply(_)) | None => {}
        }
        debug!(name = %self.name, "inproc endpoint released");
    }
}

/// Register a reply endpoint under `name`.
pub(crate) fn bind_reply(name: &str, requests: mpsc::Sender<Request>) -> Result<Binding> {
    let mut registry = registry();
    sweep_stale(&mut registry);
    if let Some(existing) = registry.get(name).filter(|e| !e.is_stale()) {
        return Err(match existing {
            Endpoint::Subscribers(_) => IpcError::Unsupported(format!(
                "inproc://{} has subscribers waiting for a publisher",
                name
            )),
            _ => IpcError::AddressInUse(format!("inproc://{}", name)),
        });
    }

    registry.insert(name.to_string(), Endpoint::Reply(requests));
    debug!(name, "inproc reply endpoint bound");
    Ok(Binding {
        name: name.to_string(),
    })
}

/// Register a publish endpoint under `name`, adopting waiting subscribers.
pub(crate) fn bind_publish(name: &str, hub: Arc<Hub>) -> Result<Binding> {
    let mut registry = registry();
    match registry.remove(name) {
        None => {}
        Some(Endpoint::Subscribers(pending)) => {
            let adopted = pending.into_iter().filter(|tx| !tx.is_closed());
            for link in adopted {
                hub.attach(link);
            }
        }
        Some(other) => {
            registry.insert(name.to_string(), other);
            return Err(IpcError::AddressInUse(format!("inproc://{}", name)));
        }
    }

    registry.insert(name.to_string(), Endpoint::Publish(hub));
    debug!(name, "inproc publish endpoint bound");
    Ok(Binding {
        name: name.to_string(),
    })
}

/// Request channel of the reply endpoint at `name`, if one is bound.
///
/// # Errors
///
/// Returns `Unsupported` if the name belongs to a publish/subscribe endpoint.
pub(crate) fn lookup_reply(name: &str) -> Result<Option<mpsc::Sender<Request>>> {
    match registry().get(name).filter(|e| !e.is_stale()) {
        None => Ok(None),
        Some(Endpoint::Reply(tx)) => Ok(Some(tx.clone())),
        Some(other) => Err(IpcError::Unsupported(format!(
            "inproc://{} is a {} endpoint",
            name,
            other.role()
        ))),
    }
}

/// Link a subscriber to the publisher at `name`, now or once one binds.
///
/// # Errors
///
/// Returns `Unsupported` if the name belongs to a reply endpoint.
pub(crate) fn dial_subscriber(name: &str, link: mpsc::Sender<Bytes>) -> Result<()> {
    let mut registry = registry();
    sweep_stale(&mut registry);
    match registry.get_mut(name) {
        None => {
            registry.insert(name.to_string(), Endpoint::Subscribers(vec![link]));
        }
        Some(Endpoint::Subscribers(pending)) => {
            pending.retain(|tx| !tx.is_closed());
            pending.push(link);
        }
        Some(Endpoint::Publish(hub)) => hub.attach(link),
        Some(Endpoint::Reply(_)) => {
            return Err(IpcError::Unsupported(format!(
                "inproc://{} is a reply endpoint",
                name
            )));
        }
    }

    debug!(name, "inproc subscriber dialed");
    Ok(())
}
