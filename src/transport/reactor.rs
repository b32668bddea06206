//! Reactor - the runtime that owns the transport worker threads.
//!
//! Every pump, listener and dialer runs as a task on a reactor. Contexts
//! share the process-wide reactor returned by [`Reactor::global`] unless a
//! builder is handed a dedicated one.
//!
//! Blocking entry points ([`Reactor::block_on`]) work from plain threads and
//! from inside a multi-thread tokio runtime (via `block_in_place`), so a
//! transaction handler may itself call another server.
//!
//! # Example
//!
//! ```
//! use parcelwire::transport::{Reactor, ReactorConfig};
//!
//! let reactor = Reactor::new(ReactorConfig::default()).unwrap();
//! let answer = reactor.block_on(async { 40 + 2 }).unwrap();
//! assert_eq!(answer, 42);
//! ```

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{IpcError, Result};

/// Default number of reactor worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default worker thread name.
pub const DEFAULT_THREAD_NAME: &str = "parcelwire-aio";

static GLOBAL: OnceLock<Arc<Reactor>> = OnceLock::new();

/// Reactor configuration.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Number of worker threads delivering completions.
    pub worker_threads: usize,
    /// Name given to every worker thread.
    pub thread_name: String,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Multi-thread runtime shared by transport contexts.
pub struct Reactor {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Reactor {
    /// Build a dedicated reactor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for zero workers, or the I/O error raised
    /// while spawning the worker threads.
    pub fn new(config: ReactorConfig) -> Result<Arc<Self>> {
        if config.worker_threads == 0 {
            return Err(IpcError::InvalidArgument(
                "reactor needs at least one worker thread".to_string(),
            ));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        debug!(
            workers = config.worker_threads,
            thread_name = %config.thread_name,
            "reactor started"
        );

        Ok(Arc::new(Self {
            runtime: Some(runtime),
            handle,
        }))
    }

    /// The process-wide reactor, built on first use with default settings.
    pub fn global() -> Result<Arc<Self>> {
        if let Some(reactor) = GLOBAL.get() {
            return Ok(Arc::clone(reactor));
        }

        // A racing thread may win the set; the loser's runtime is dropped.
        let _ = GLOBAL.set(Self::new(ReactorConfig::default())?);
        GLOBAL
            .get()
            .cloned()
            .ok_or_else(|| IpcError::Resource("global reactor unavailable".to_string()))
    }

    /// Runtime handle for spawning.
    #[inline]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawn a task on the reactor.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run a future to completion, blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when called from a current-thread runtime,
    /// where blocking would stall the caller's own executor.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        match Handle::try_current() {
            Err(_) => Ok(self.handle.block_on(future)),
            Ok(current) => match current.runtime_flavor() {
                RuntimeFlavor::MultiThread => Ok(tokio::task::block_in_place(|| {
                    self.handle.block_on(future)
                })),
                _ => Err(IpcError::InvalidArgument(
                    "blocking call from a current-thread runtime; use the async API".to_string(),
                )),
            },
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Drop may run on a worker thread, where a blocking shutdown panics.
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_from_plain_thread() {
        let reactor = Reactor::new(ReactorConfig::default()).unwrap();
        assert_eq!(reactor.block_on(async { 7 }).unwrap(), 7);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ReactorConfig {
            worker_threads: 0,
            ..Default::default()
        };
        assert!(matches!(
            Reactor::new(config),
            Err(IpcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_global_is_shared() {
        let a = Reactor::global().unwrap();
        let b = Reactor::global().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_spawned_task_runs_on_named_worker() {
        let reactor = Reactor::new(ReactorConfig::default()).unwrap();
        let task = reactor.spawn(async {
            std::thread::current().name().map(str::to_string)
        });

        let name = reactor.block_on(task).unwrap().unwrap();
        assert_eq!(name.as_deref(), Some(DEFAULT_THREAD_NAME));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_on_inside_multi_thread_runtime() {
        let reactor = Reactor::new(ReactorConfig::default()).unwrap();
        assert_eq!(reactor.block_on(async { 1 + 1 }).unwrap(), 2);
        drop(reactor);
    }

    #[tokio::test]
    async fn test_block_on_rejected_on_current_thread_runtime() {
        let reactor = Reactor::new(ReactorConfig::default()).unwrap();
        assert!(matches!(
            reactor.block_on(async {}),
            Err(IpcError::InvalidArgument(_))
        ));
        drop(reactor);
    }
}
