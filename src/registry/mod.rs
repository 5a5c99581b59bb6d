//! Registry mapping a channel's type identity to its single instance.
//!
//! The bus keeps one registry per delivery mode. Each slot is created at most
//! once, even when the first requests for a type race each other.

use crate::channel::{AsyncEventChannel, EventChannel};
use crate::Event;
use std::any::Any;

mod dashmap;
pub use dashmap::ChannelRegistry;

/// A channel instance that can live in a [`ChannelRegistry`].
///
/// Slots are type-erased; `as_any` is how the registry recovers the concrete
/// channel type.
pub trait RegisteredChannel: Any + Send + Sync {
    /// Self as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Name of the event type the channel carries
    fn event_type(&self) -> &'static str;

    /// Live subscriptions across all channel names
    fn subscriptions(&self) -> usize;
}

impl<T: Event> RegisteredChannel for EventChannel<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn event_type(&self) -> &'static str {
        T::event_type()
    }

    fn subscriptions(&self) -> usize {
        self.stats().subscriptions
    }
}

impl<T: Event> RegisteredChannel for AsyncEventChannel<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn event_type(&self) -> &'static str {
        T::event_type()
    }

    fn subscriptions(&self) -> usize {
        self.stats().subscriptions
    }
}

/// Registry statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of channel instances created
    pub channels: usize,

    /// Live subscriptions across every registered channel
    pub subscriptions: usize,
}
