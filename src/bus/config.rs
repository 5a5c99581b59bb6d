//! Configuration for the event bus.

use crate::dispatcher::WorkerConfig;
use crate::Result;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Worker pool configuration for `NewTask` dispatches
    pub worker: WorkerConfig,

    /// Let `CallerContext` subscriptions fall back to the current Tokio
    /// runtime when the subscribing thread has no executor installed
    pub runtime_fallback: bool,

    /// Initial capacity of the per-type channel registries
    pub initial_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            runtime_fallback: true,
            initial_capacity: 64,
        }
    }
}

impl EventBusConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads used when the pool owns its runtime
    pub fn worker_threads(mut self, workers: usize) -> Self {
        self.worker = self.worker.num_workers(workers);
        self
    }

    /// Set the worker thread name prefix
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker = self.worker.name_prefix(name);
        self
    }

    /// Always run `NewTask` handlers on a runtime owned by the bus
    pub fn dedicated_pool(mut self, dedicated: bool) -> Self {
        self.worker = self.worker.dedicated(dedicated);
        self
    }

    /// Enable or disable the runtime fallback for `CallerContext`
    pub fn runtime_fallback(mut self, enable: bool) -> Self {
        self.runtime_fallback = enable;
        self
    }

    /// Set the initial registry capacity
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Configure the worker pool
    pub fn worker_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(WorkerConfig) -> WorkerConfig,
    {
        self.worker = f(self.worker);
        self
    }

    /// Check the configuration for values the bus cannot run with
    pub fn validate(&self) -> Result<()> {
        self.worker.validate()
    }
}

/// Preset configurations for common use cases
impl EventBusConfig {
    /// Configuration for testing
    pub fn test() -> Self {
        Self::default()
            .worker_threads(2)
            .thread_name("event-test-worker")
            .initial_capacity(8)
    }

    /// One background worker, so `NewTask` handlers never overlap when the
    /// pool owns its runtime
    pub fn single_worker() -> Self {
        Self::default().worker_threads(1).dedicated_pool(true)
    }
}
