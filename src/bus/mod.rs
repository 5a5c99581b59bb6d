//! The main EventBus implementation.
//!
//! The EventBus hands out one [`EventChannel`] and one [`AsyncEventChannel`]
//! per event type, creating each on first request. Channels live as long as
//! the bus.

use crate::channel::{AsyncEventChannel, EventChannel};
use crate::dispatcher::WorkerPool;
use crate::registry::ChannelRegistry;
use crate::subscription::SubscriptionToken;
use crate::{DispatchPolicy, Event, Result};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;
use tracing::{error, info};

pub mod builder;
pub mod config;

pub use builder::EventBusBuilder;
pub use config::EventBusConfig;

/// The type-indexed event bus.
///
/// Cloning is cheap; clones share every channel.
///
/// # Example
///
/// ```rust
/// use tokio_channels::{DispatchPolicy, EventBus};
///
/// #[derive(Debug, Clone)]
/// struct DialogClosed {
///     accepted: bool,
/// }
///
/// let bus = EventBus::new();
///
/// let token = bus.subscribe(
///     |event: DialogClosed| {
///         println!("dialog closed, accepted = {}", event.accepted);
///         Ok(())
///     },
///     DispatchPolicy::PublishThread,
/// );
///
/// bus.publish(DialogClosed { accepted: true }).unwrap();
/// token.unsubscribe();
/// ```
#[derive(Clone)]
pub struct EventBus {
    pub(crate) shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) config: EventBusConfig,
    pub(crate) sync_channels: ChannelRegistry,
    pub(crate) async_channels: ChannelRegistry,
    pub(crate) pool: Arc<WorkerPool>,
}

impl EventBus {
    /// Create a bus with the default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default(), None)
    }

    pub(crate) fn with_config(config: EventBusConfig, runtime: Option<Handle>) -> Self {
        let capacity = config.initial_capacity;
        Self {
            shared: Arc::new(Shared {
                sync_channels: ChannelRegistry::with_capacity(capacity),
                async_channels: ChannelRegistry::with_capacity(capacity),
                pool: Arc::new(WorkerPool::from_config(config.worker.clone(), runtime)),
                config,
            }),
        }
    }

    /// Create a new EventBus builder
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// The synchronous channel for `T`, created on first request
    pub fn channel<T: Event>(&self) -> EventChannel<T> {
        self.shared.sync_channels.get_or_insert_with(|| {
            EventChannel::new(self.shared.pool.clone(), self.shared.config.runtime_fallback)
        })
    }

    /// The asynchronous channel for `T`, created on first request.
    ///
    /// Independent of [`channel`](Self::channel): publishing on one never
    /// reaches subscribers of the other.
    pub fn async_channel<T: Event>(&self) -> AsyncEventChannel<T> {
        self.shared.async_channels.get_or_insert_with(|| {
            AsyncEventChannel::new(self.shared.pool.clone(), self.shared.config.runtime_fallback)
        })
    }

    /// Publish on the default channel of `T`'s synchronous channel
    pub fn publish<T: Event>(&self, event: T) -> Result<()> {
        self.channel::<T>().publish(event)
    }

    /// Publish on a named channel of `T`'s synchronous channel
    pub fn publish_on<T: Event>(&self, channel: &str, event: T) -> Result<()> {
        self.channel::<T>().publish_on(channel, event)
    }

    /// Subscribe to the default channel of `T`'s synchronous channel
    pub fn subscribe<T, F>(&self, handler: F, policy: DispatchPolicy) -> SubscriptionToken
    where
        T: Event,
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        self.channel::<T>().subscribe(handler, policy)
    }

    /// Subscribe to a named channel of `T`'s synchronous channel
    pub fn subscribe_on<T, F>(
        &self,
        channel: &str,
        handler: F,
        policy: DispatchPolicy,
    ) -> SubscriptionToken
    where
        T: Event,
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        self.channel::<T>().subscribe_on(channel, handler, policy)
    }

    /// Get the bus configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.shared.config
    }

    /// Get bus statistics
    pub fn stats(&self) -> EventBusStats {
        let sync = self.shared.sync_channels.stats();
        let asynchronous = self.shared.async_channels.stats();
        EventBusStats {
            sync_channels: sync.channels,
            async_channels: asynchronous.channels,
            subscriptions: sync.subscriptions + asynchronous.subscriptions,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("sync_channels", &self.shared.sync_channels)
            .field("async_channels", &self.shared.async_channels)
            .field("pool", &self.shared.pool)
            .finish()
    }
}

/// Statistics about the event bus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBusStats {
    /// Synchronous channels created so far
    pub sync_channels: usize,

    /// Asynchronous channels created so far
    pub async_channels: usize,

    /// Live subscriptions across every channel
    pub subscriptions: usize,
}

/// The process-wide bus, created on first use.
///
/// Its worker pool always owns a private runtime, so the bus does not depend
/// on whichever runtime happened to be current when it was first touched.
pub fn global() -> &'static EventBus {
    static GLOBAL: OnceLock<EventBus> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        info!("Creating process-wide EventBus");
        EventBus::builder()
            .configure(|c| c.dedicated_pool(true))
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Falling back to the default EventBus");
                EventBus::new()
            })
    })
}
