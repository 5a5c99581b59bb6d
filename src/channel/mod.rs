//! Typed channels: the publish/subscribe surface for one event type.
//!
//! Each channel instance partitions its subscribers by channel name. A name's
//! bucket is created on first use, by either a subscribe or a publish, and
//! lives as long as the channel.

use crate::subscription::SubscriberList;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod async_channel;
pub mod sync_channel;

pub use async_channel::AsyncEventChannel;
pub use sync_channel::EventChannel;

/// Channel name to subscriber list, with atomic insert-if-absent
pub(crate) struct ChannelMap<H> {
    buckets: DashMap<String, Arc<SubscriberList<H>>>,
}

impl<H> ChannelMap<H> {
    pub(crate) fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// The list for `name`, created if absent.
    ///
    /// The map guard is released before returning so callers can run
    /// handlers without holding a shard lock.
    pub(crate) fn bucket(&self, name: &str) -> Arc<SubscriberList<H>> {
        if let Some(existing) = self.buckets.get(name) {
            return Arc::clone(&existing);
        }
        Arc::clone(&self.buckets.entry(name.to_string()).or_default())
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.buckets.iter().map(|entry| entry.key().clone()).collect()
    }

    pub(crate) fn subscriber_count(&self, name: &str) -> usize {
        self.buckets.get(name).map(|list| list.len()).unwrap_or(0)
    }

    pub(crate) fn total_subscribers(&self) -> usize {
        self.buckets.iter().map(|entry| entry.value().len()).sum()
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Running totals shared with background dispatches
#[derive(Debug, Default)]
pub(crate) struct Counters {
    published: AtomicU64,
    invocations: AtomicU64,
    failures: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invoked(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot<H>(&self, channels: &ChannelMap<H>) -> ChannelStats {
        ChannelStats {
            channels: channels.len(),
            subscriptions: channels.total_subscribers(),
            events_published: self.published.load(Ordering::Relaxed),
            handler_invocations: self.invocations.load(Ordering::Relaxed),
            handler_failures: self.failures.load(Ordering::Relaxed),
            dropped_dispatches: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for one typed channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Number of channel names seen so far
    pub channels: usize,

    /// Live subscriptions across all channel names
    pub subscriptions: usize,

    /// Publish calls
    pub events_published: u64,

    /// Handler invocations that have started, inline or in the background
    pub handler_invocations: u64,

    /// Handler invocations that returned an error
    pub handler_failures: u64,

    /// Dispatches dropped because no execution context was available
    pub dropped_dispatches: u64,
}

impl fmt::Display for ChannelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subscriptions on {} channels, {} published, {} invocations ({} failed, {} dropped)",
            self.subscriptions,
            self.channels,
            self.events_published,
            self.handler_invocations,
            self.handler_failures,
            self.dropped_dispatches
        )
    }
}
