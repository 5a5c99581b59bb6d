//! Subscriptions and the per-channel subscriber lists that own them.
//!
//! A [`SubscriberList`] keeps subscriptions in registration order. Publishing
//! never walks the live list: it takes a snapshot, releases the lock, and
//! walks the snapshot from the newest entry to the oldest, skipping every
//! entry whose tombstone was set in the meantime. Handlers are therefore free
//! to subscribe or unsubscribe (themselves or others) while being invoked.

use crate::context::Executor;
use crate::DispatchPolicy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

pub mod handle;
pub mod handler;

pub use handle::SubscriptionToken;
pub use handler::{
    AsyncEventHandler, AsyncFunctionHandler, EventHandler, FilteredHandler, FunctionHandler,
};

/// One registered handler
pub struct Subscription<H> {
    id: Uuid,
    channel: String,
    handler: H,
    policy: DispatchPolicy,
    context: Option<Arc<dyn Executor>>,
    active: AtomicBool,
}

impl<H> Subscription<H> {
    pub(crate) fn new(
        channel: &str,
        handler: H,
        policy: DispatchPolicy,
        context: Option<Arc<dyn Executor>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            handler,
            policy,
            context,
            active: AtomicBool::new(true),
        }
    }

    /// Unique ID for this subscription
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel name the subscription was registered under
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The registered handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Dispatch policy chosen at subscribe time
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Context captured for `CallerContext` dispatch
    pub fn context(&self) -> Option<&Arc<dyn Executor>> {
        self.context.as_ref()
    }

    /// Whether the subscription has not been removed yet
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl<H> fmt::Debug for Subscription<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("policy", &self.policy)
            .field("has_context", &self.context.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Ordered subscriptions of one channel name
pub struct SubscriberList<H> {
    entries: RwLock<Vec<Arc<Subscription<H>>>>,
}

impl<H> SubscriberList<H> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append a subscription
    pub fn push(&self, subscription: Arc<Subscription<H>>) {
        self.entries.write().push(subscription);
    }

    /// Remove a subscription by identity.
    ///
    /// The subscription is tombstoned before it leaves the list, so a publish
    /// pass holding an older snapshot skips it. Returns `false` when the
    /// subscription is not in the list.
    ///
    /// The removed entry is released after the lock, since dropping its
    /// handler may unsubscribe other entries of this list.
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = {
            let mut entries = self.entries.write();
            entries.iter().position(|s| s.id == id).map(|index| {
                let removed = entries.remove(index);
                removed.deactivate();
                removed
            })
        };
        match removed {
            Some(removed) => {
                trace!(subscription_id = %id, channel = %removed.channel, "Subscription removed");
                true
            }
            None => false,
        }
    }

    /// Copy of the current subscriptions in registration order
    pub fn snapshot(&self) -> Vec<Arc<Subscription<H>>> {
        self.entries.read().clone()
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<H> Default for SubscriberList<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for SubscriberList<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.len())
            .finish()
    }
}
