//! Dispatch policies and the worker pool behind `NewTask`.
//!
//! A subscription's policy decides where its handler runs relative to the
//! publisher. The policy is evaluated every time the subscription is
//! reached during a publish pass.

use std::fmt;

pub mod pool;

pub use pool::{WorkerConfig, WorkerPool};

/// Where a subscriber's handler runs relative to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchPolicy {
    /// Scheduled on the execution context captured at subscribe time.
    ///
    /// If no context was captured or it has since shut down, the dispatch is
    /// dropped silently.
    #[default]
    CallerContext,

    /// Run inline on the publishing thread or task before `publish` returns.
    ///
    /// This is the only policy whose failures reach the publisher.
    PublishThread,

    /// Submitted to the bus worker pool; the publisher does not wait.
    NewTask,
}

impl DispatchPolicy {
    /// Whether the publisher waits for handlers with this policy
    pub fn is_inline(self) -> bool {
        matches!(self, DispatchPolicy::PublishThread)
    }

    /// Stable name used in log records
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchPolicy::CallerContext => "caller_context",
            DispatchPolicy::PublishThread => "publish_thread",
            DispatchPolicy::NewTask => "new_task",
        }
    }
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one subscription during a publish pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// The handler ran inline and finished
    Completed,
    /// The handler was handed to an executor
    Scheduled,
    /// The handler was not run: its context was missing or gone
    Dropped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert_eq!(DispatchPolicy::default(), DispatchPolicy::CallerContext);
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(DispatchPolicy::PublishThread.to_string(), "publish_thread");
        assert_eq!(DispatchPolicy::NewTask.to_string(), "new_task");
        assert!(DispatchPolicy::PublishThread.is_inline());
        assert!(!DispatchPolicy::CallerContext.is_inline());
    }
}
