//! Execution contexts for `CallerContext` subscriptions.
//!
//! A subscriber that asks for [`DispatchPolicy::CallerContext`] wants its
//! handler to run wherever it was when it subscribed: a single-threaded event
//! loop, an actor mailbox, a UI dispatcher. The bus does not know what that
//! place is; it only needs something that can schedule a callback, which is
//! what [`Executor`] describes.
//!
//! The "current" executor is a per-thread slot. Install one with [`enter`]
//! before subscribing and the subscription captures it.
//!
//! [`DispatchPolicy::CallerContext`]: crate::DispatchPolicy::CallerContext

use crate::Result;
use futures::future::BoxFuture;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub mod event_loop;
pub mod runtime;

pub use event_loop::{EventLoop, LoopHandle};
pub use runtime::RuntimeContext;

/// A unit of synchronous work handed to an executor
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run callbacks on behalf of a subscriber.
///
/// Both methods return [`Error::ContextUnavailable`] once the underlying
/// context has shut down; callers treat that as "drop the dispatch".
///
/// [`Error::ContextUnavailable`]: crate::Error::ContextUnavailable
pub trait Executor: Send + Sync + fmt::Debug {
    /// Schedule a synchronous job
    fn execute(&self, job: Job) -> Result<()>;

    /// Schedule a future to be driven to completion
    fn spawn(&self, future: BoxFuture<'static, ()>) -> Result<()>;
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn Executor>>> = const { RefCell::new(None) };
}

/// The executor installed on the calling thread, if any
pub fn current() -> Option<Arc<dyn Executor>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Install `executor` as the calling thread's current context.
///
/// The previous context is restored when the returned guard drops.
pub fn enter(executor: Arc<dyn Executor>) -> ContextGuard {
    let previous = CURRENT.with(|slot| slot.replace(Some(executor)));
    ContextGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Resolve the context a `CallerContext` subscription should capture.
///
/// The thread's installed executor wins. Otherwise, when `runtime_fallback`
/// is set, the ambient Tokio runtime is used.
pub fn capture(runtime_fallback: bool) -> Option<Arc<dyn Executor>> {
    current().or_else(|| {
        if !runtime_fallback {
            return None;
        }
        tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| Arc::new(RuntimeContext::new(handle)) as Arc<dyn Executor>)
    })
}

/// Restores the previously installed context on drop.
///
/// Must be dropped on the thread that created it.
#[must_use = "the context is uninstalled as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Arc<dyn Executor>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("previous", &self.previous)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_and_restore() {
        assert!(current().is_none());

        let mut outer = EventLoop::new();
        let mut inner = EventLoop::new();

        {
            let _outer = enter(outer.executor());
            assert!(current().is_some());

            {
                let _inner = enter(inner.executor());
                current().unwrap().execute(Box::new(|| {})).unwrap();
            }
            assert_eq!(inner.run_pending(), 1);
            assert_eq!(outer.run_pending(), 0);

            current().unwrap().execute(Box::new(|| {})).unwrap();
            assert_eq!(outer.run_pending(), 1);
        }

        assert!(current().is_none());
    }

    #[test]
    fn test_capture_without_runtime() {
        assert!(capture(true).is_none());
        assert!(capture(false).is_none());
    }

    #[tokio::test]
    async fn test_capture_falls_back_to_runtime() {
        assert!(capture(true).is_some());
        assert!(capture(false).is_none());
    }

    #[test]
    fn test_context_is_thread_local() {
        let event_loop = EventLoop::new();
        let _guard = enter(event_loop.executor());

        let seen_elsewhere = std::thread::spawn(|| current().is_some()).join().unwrap();
        assert!(!seen_elsewhere);
        assert!(current().is_some());
    }
}
