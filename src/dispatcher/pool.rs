//! Worker pool for `NewTask` dispatches.

use crate::context::{Executor, Job, RuntimeContext};
use crate::{Error, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker threads when the pool starts its own runtime
    pub num_workers: usize,

    /// Worker thread name prefix
    pub name_prefix: String,

    /// Always start a private runtime instead of borrowing the ambient one
    pub dedicated: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            name_prefix: "event-worker".to_string(),
            dedicated: false,
        }
    }
}

impl WorkerConfig {
    /// Create a new worker configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    /// Set the worker thread name prefix
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Force a private runtime
    pub fn dedicated(mut self, dedicated: bool) -> Self {
        self.dedicated = dedicated;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::config("worker pool needs at least one worker"));
        }
        if self.name_prefix.is_empty() {
            return Err(Error::config("worker thread name prefix must not be empty"));
        }
        Ok(())
    }
}

/// The general-purpose pool `NewTask` handlers run on.
///
/// Borrows a Tokio runtime when one is given, otherwise starts a private
/// multi-thread runtime the first time work arrives. Work submitted after
/// a borrowed runtime has shut down is refused.
pub struct WorkerPool {
    config: WorkerConfig,
    context: OnceLock<RuntimeContext>,
    runtime: Mutex<Option<Runtime>>,
}

impl WorkerPool {
    /// Create a pool that starts its own runtime on demand
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            context: OnceLock::new(),
            runtime: Mutex::new(None),
        }
    }

    /// Create a pool on top of an existing runtime
    pub fn with_handle(config: WorkerConfig, handle: Handle) -> Self {
        let pool = Self::new(config);
        let _ = pool.context.set(RuntimeContext::new(handle));
        pool
    }

    /// Borrow the ambient runtime if there is one and the configuration
    /// allows it, otherwise defer to a private runtime.
    pub(crate) fn from_config(config: WorkerConfig, runtime: Option<Handle>) -> Self {
        if config.dedicated {
            return Self::new(config);
        }
        match runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => {
                debug!("Worker pool borrowing the current runtime");
                Self::with_handle(config, handle)
            }
            None => Self::new(config),
        }
    }

    /// Whether the pool owns a runtime it started itself
    pub fn owns_runtime(&self) -> bool {
        self.runtime.lock().is_some()
    }

    fn context(&self) -> Result<&RuntimeContext> {
        if let Some(context) = self.context.get() {
            return Ok(context);
        }

        let mut slot = self.runtime.lock();
        if let Some(context) = self.context.get() {
            return Ok(context);
        }

        info!(
            "Starting worker pool with {} workers",
            self.config.num_workers
        );

        let runtime = Builder::new_multi_thread()
            .worker_threads(self.config.num_workers)
            .thread_name(self.config.name_prefix.clone())
            .enable_all()
            .build()
            .map_err(|e| Error::PoolUnavailable(e.to_string()))?;

        let context = RuntimeContext::new(runtime.handle().clone());
        *slot = Some(runtime);
        Ok(self.context.get_or_init(|| context))
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) -> Result<()> {
        self.context()?.execute(job)
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) -> Result<()> {
        self.context()?.spawn(future)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            info!("Stopping worker pool");
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("started", &self.context.get().is_some())
            .finish()
    }
}
