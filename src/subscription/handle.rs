//! Subscription token for managing subscription lifecycle.

use super::SubscriberList;
use crate::event::DEFAULT_CHANNEL;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

/// Back-reference from a token to the list holding its subscription
trait Unlink: Send + Sync {
    fn unlink(&self, id: Uuid) -> bool;
}

impl<H: Send + Sync + 'static> Unlink for Weak<SubscriberList<H>> {
    fn unlink(&self, id: Uuid) -> bool {
        self.upgrade().is_some_and(|list| list.remove(id))
    }
}

/// A capability to remove one subscription, exactly once.
///
/// Dropping the token unsubscribes. Call [`detach`](Self::detach) to keep the
/// subscription for the lifetime of its channel instead.
#[must_use = "dropping a SubscriptionToken unsubscribes immediately"]
pub struct SubscriptionToken {
    /// Unique ID of the subscription
    id: Uuid,

    /// Channel the subscription lives on
    channel: String,

    /// Cleared by the first unsubscribe
    target: Mutex<Option<Box<dyn Unlink>>>,
}

impl SubscriptionToken {
    pub(crate) fn new<H: Send + Sync + 'static>(
        list: &Arc<SubscriberList<H>>,
        id: Uuid,
        channel: &str,
    ) -> Self {
        Self {
            id,
            channel: channel.to_string(),
            target: Mutex::new(Some(Box::new(Arc::downgrade(list)))),
        }
    }

    /// Get the subscription ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the channel name the subscription was registered under
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remove the subscription.
    ///
    /// Returns `true` only for the call that actually removed it. Repeated or
    /// racing calls, and calls after the subscription disappeared some other
    /// way, return `false`.
    pub fn unsubscribe(&self) -> bool {
        let target = self.target.lock().take();
        match target {
            Some(target) => {
                let removed = target.unlink(self.id);
                debug!(subscription_id = %self.id, channel = %self.channel, removed, "Unsubscribed");
                removed
            }
            None => false,
        }
    }

    /// Check if this token can still unsubscribe
    pub fn is_active(&self) -> bool {
        self.target.lock().is_some()
    }

    /// Give up the token, leaving the subscription in place
    pub fn detach(self) {
        self.target.lock().take();
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.channel == DEFAULT_CHANNEL {
            write!(f, "Subscription ({})", self.id)
        } else {
            write!(f, "Subscription '{}' ({})", self.channel, self.id)
        }
    }
}
