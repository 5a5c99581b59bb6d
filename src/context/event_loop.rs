//! A single-threaded mailbox executor.
//!
//! The owner of an [`EventLoop`] decides which thread runs the queued work by
//! calling one of the `run*` methods there. [`LoopHandle`]s can be cloned and
//! moved anywhere; they only enqueue.

use super::{Executor, Job};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

enum Task {
    Call(Job),
    Poll(BoxFuture<'static, ()>),
    Quit,
}

/// A queue of callbacks run on whichever thread drives it.
///
/// # Example
///
/// ```rust
/// use tokio_channels::context::{self, EventLoop};
///
/// let mut event_loop = EventLoop::new();
/// let _guard = context::enter(event_loop.executor());
///
/// // ... subscribe with DispatchPolicy::CallerContext, publish from anywhere ...
///
/// event_loop.run_pending();
/// ```
pub struct EventLoop {
    id: Uuid,
    sender: mpsc::UnboundedSender<Task>,
    receiver: mpsc::UnboundedReceiver<Task>,
}

impl EventLoop {
    /// Create an idle loop
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            sender,
            receiver,
        }
    }

    /// A handle that schedules work onto this loop
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            id: self.id,
            sender: self.sender.clone(),
        }
    }

    /// The handle as a shareable [`Executor`]
    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::new(self.handle())
    }

    /// Run everything queued right now without waiting for more.
    ///
    /// Futures are driven to completion on the calling thread. Returns the
    /// number of tasks that ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            match task {
                Task::Call(job) => run_job(self.id, job),
                Task::Poll(future) => futures::executor::block_on(run_future(self.id, future)),
                Task::Quit => continue,
            }
            ran += 1;
        }
        ran
    }

    /// Block the calling thread running tasks until [`LoopHandle::quit`] is
    /// called.
    ///
    /// Must not be called from inside an asynchronous context; use
    /// [`run_async`](Self::run_async) there.
    pub fn run(&mut self) {
        debug!(loop_id = %self.id, "Event loop started");
        while let Some(task) = self.receiver.blocking_recv() {
            match task {
                Task::Call(job) => run_job(self.id, job),
                Task::Poll(future) => futures::executor::block_on(run_future(self.id, future)),
                Task::Quit => break,
            }
        }
        debug!(loop_id = %self.id, "Event loop stopped");
    }

    /// Run tasks, awaiting futures in turn, until [`LoopHandle::quit`] is
    /// called.
    pub async fn run_async(&mut self) {
        debug!(loop_id = %self.id, "Event loop started");
        while let Some(task) = self.receiver.recv().await {
            match task {
                Task::Call(job) => run_job(self.id, job),
                Task::Poll(future) => run_future(self.id, future).await,
                Task::Quit => break,
            }
        }
        debug!(loop_id = %self.id, "Event loop stopped");
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop").field("id", &self.id).finish()
    }
}

fn run_job(loop_id: Uuid, job: Job) {
    trace!(loop_id = %loop_id, "Running job");
    if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!(loop_id = %loop_id, "Job panicked on event loop");
    }
}

async fn run_future(loop_id: Uuid, future: BoxFuture<'static, ()>) {
    trace!(loop_id = %loop_id, "Running future");
    if AssertUnwindSafe(future).catch_unwind().await.is_err() {
        warn!(loop_id = %loop_id, "Future panicked on event loop");
    }
}

/// Cloneable sender side of an [`EventLoop`]
#[derive(Clone)]
pub struct LoopHandle {
    id: Uuid,
    sender: mpsc::UnboundedSender<Task>,
}

impl LoopHandle {
    /// Ask the loop to return from [`EventLoop::run`] or
    /// [`EventLoop::run_async`] after the tasks queued before this call.
    pub fn quit(&self) -> Result<()> {
        self.send(Task::Quit)
    }

    /// Whether the loop still exists
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    fn send(&self, task: Task) -> Result<()> {
        self.sender.send(task).map_err(|_| Error::ContextUnavailable)
    }
}

impl Executor for LoopHandle {
    fn execute(&self, job: Job) -> Result<()> {
        self.send(Task::Call(job))
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) -> Result<()> {
        self.send(Task::Poll(future))
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
