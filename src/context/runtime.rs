//! Tokio runtime as an execution context.

use super::{Executor, Job};
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Runs scheduled work on a Tokio runtime.
///
/// Synchronous jobs go to the blocking pool so a slow handler never stalls
/// the runtime's workers. A handle outlives its runtime, so every context
/// parks a sentinel task on the runtime and refuses work once that task has
/// been dropped by shutdown.
#[derive(Clone)]
pub struct RuntimeContext {
    handle: Handle,
    alive: Arc<oneshot::Sender<()>>,
}

impl RuntimeContext {
    /// Wrap a runtime handle
    pub fn new(handle: Handle) -> Self {
        let (alive, sentinel) = oneshot::channel::<()>();
        // Resolves once every clone of this context is gone
        drop(handle.spawn(async move {
            let _ = sentinel.await;
        }));
        Self {
            handle,
            alive: Arc::new(alive),
        }
    }

    /// The runtime this context is bound to, if called from inside one
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// The wrapped handle
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Whether the runtime still accepts work
    pub fn is_alive(&self) -> bool {
        !self.alive.is_closed()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::ContextUnavailable)
        }
    }
}

impl Executor for RuntimeContext {
    fn execute(&self, job: Job) -> Result<()> {
        self.ensure_alive()?;
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) -> Result<()> {
        self.ensure_alive()?;
        drop(self.handle.spawn(future));
        Ok(())
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("flavor", &self.handle.runtime_flavor())
            .field("alive", &self.is_alive())
            .finish()
    }
}
