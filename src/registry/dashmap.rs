//! DashMap-backed channel registry.

use super::{RegisteredChannel, RegistryStats};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::TypeId;
use std::fmt;
use tracing::{debug, error};

/// Type identity to channel instance, with race-free lazy creation.
///
/// Contention is per shard, so requests for unrelated types rarely meet.
pub struct ChannelRegistry {
    channels: DashMap<TypeId, Box<dyn RegisteredChannel>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Create a registry with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::with_capacity(capacity),
        }
    }

    /// The registered `C`, created with `make` if this is the first request.
    ///
    /// Concurrent first requests all receive the instance whichever of them
    /// won the insert created; `make` runs at most once per successful
    /// insert.
    pub fn get_or_insert_with<C, F>(&self, make: F) -> C
    where
        C: RegisteredChannel + Clone,
        F: FnOnce() -> C,
    {
        let key = TypeId::of::<C>();

        if let Some(existing) = self.channels.get(&key) {
            if let Some(channel) = existing.as_any().downcast_ref::<C>() {
                return channel.clone();
            }
        }

        match self.channels.entry(key) {
            Entry::Occupied(mut slot) => {
                if let Some(channel) = slot.get().as_any().downcast_ref::<C>() {
                    return channel.clone();
                }
                error!(
                    expected = std::any::type_name::<C>(),
                    found = slot.get().event_type(),
                    "Registry slot holds a foreign channel type, replacing it"
                );
                let channel = make();
                slot.insert(Box::new(channel.clone()));
                channel
            }
            Entry::Vacant(slot) => {
                let channel = make();
                debug!(
                    channel_type = std::any::type_name::<C>(),
                    event_type = channel.event_type(),
                    "Registered channel"
                );
                slot.insert(Box::new(channel.clone()));
                channel
            }
        }
    }

    /// Check whether a `C` has been registered
    pub fn contains<C: RegisteredChannel>(&self) -> bool {
        self.channels.contains_key(&TypeId::of::<C>())
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether nothing has been registered yet
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Event type names of every registered channel
    pub fn event_types(&self) -> Vec<&'static str> {
        self.channels
            .iter()
            .map(|entry| entry.value().event_type())
            .collect()
    }

    /// Get current registry statistics
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            channels: self.channels.len(),
            subscriptions: self
                .channels
                .iter()
                .map(|entry| entry.value().subscriptions())
                .sum(),
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.event_types())
            .finish()
    }
}
