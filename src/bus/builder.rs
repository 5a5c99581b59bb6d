//! Builder pattern for constructing EventBus instances.

use crate::bus::config::EventBusConfig;
use crate::bus::EventBus;
use crate::Result;
use tokio::runtime::Handle;
use tracing::info;

/// Builder for creating EventBus instances
#[derive(Debug, Default)]
pub struct EventBusBuilder {
    config: EventBusConfig,
    runtime: Option<Handle>,
}

impl EventBusBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom configuration
    pub fn config(mut self, config: EventBusConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the event bus
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(EventBusConfig) -> EventBusConfig,
    {
        self.config = f(self.config);
        self
    }

    /// Run `NewTask` handlers on this runtime
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build with the testing configuration
    pub fn test(self) -> Self {
        self.config(EventBusConfig::test())
    }

    /// Build with a single background worker
    pub fn single_worker(self) -> Self {
        self.config(EventBusConfig::single_worker())
    }

    /// Build the EventBus
    pub fn build(self) -> Result<EventBus> {
        self.config.validate()?;

        let bus = EventBus::with_config(self.config, self.runtime);

        info!(
            workers = bus.shared.config.worker.num_workers,
            runtime_fallback = bus.shared.config.runtime_fallback,
            "EventBus built"
        );
        Ok(bus)
    }
}
