//! Asynchronous publish/subscribe for one event type.

use super::{ChannelMap, ChannelStats, Counters};
use crate::context::{self, Executor};
use crate::dispatcher::{Dispatch, WorkerPool};
use crate::event::DEFAULT_CHANNEL;
use crate::subscription::{AsyncEventHandler, AsyncFunctionHandler, Subscription, SubscriptionToken};
use crate::{DispatchPolicy, Event, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, trace};

type Handler<T> = Arc<dyn AsyncEventHandler<T>>;
type AsyncSubscription<T> = Subscription<Handler<T>>;

/// Publish/subscribe surface for events of type `T` with asynchronous
/// handlers.
///
/// `publish` awaits `PublishThread` handlers one after another, newest
/// first. `CallerContext` and `NewTask` handlers are handed off and not
/// awaited.
pub struct AsyncEventChannel<T: Event> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Event> {
    channels: ChannelMap<Handler<T>>,
    pool: Arc<WorkerPool>,
    counters: Arc<Counters>,
    runtime_fallback: bool,
}

impl<T: Event> AsyncEventChannel<T> {
    pub(crate) fn new(pool: Arc<WorkerPool>, runtime_fallback: bool) -> Self {
        debug!(event_type = T::event_type(), "Creating async event channel");
        Self {
            inner: Arc::new(Inner {
                channels: ChannelMap::new(),
                pool,
                counters: Arc::new(Counters::default()),
                runtime_fallback,
            }),
        }
    }

    /// Subscribe an async closure on the default channel
    pub fn subscribe<F, Fut>(&self, handler: F, policy: DispatchPolicy) -> SubscriptionToken
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.subscribe_on(DEFAULT_CHANNEL, handler, policy)
    }

    /// Subscribe an async closure on a named channel
    pub fn subscribe_on<F, Fut>(
        &self,
        channel: &str,
        handler: F,
        policy: DispatchPolicy,
    ) -> SubscriptionToken
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.subscribe_handler_on(channel, AsyncFunctionHandler::new(handler), policy)
    }

    /// Subscribe a handler value on the default channel
    pub fn subscribe_handler<H>(&self, handler: H, policy: DispatchPolicy) -> SubscriptionToken
    where
        H: AsyncEventHandler<T>,
    {
        self.subscribe_handler_on(DEFAULT_CHANNEL, handler, policy)
    }

    /// Subscribe a handler value on a named channel
    pub fn subscribe_handler_on<H>(
        &self,
        channel: &str,
        handler: H,
        policy: DispatchPolicy,
    ) -> SubscriptionToken
    where
        H: AsyncEventHandler<T>,
    {
        let context = match policy {
            DispatchPolicy::CallerContext => context::capture(self.inner.runtime_fallback),
            _ => None,
        };
        if policy == DispatchPolicy::CallerContext && context.is_none() {
            debug!(
                event_type = T::event_type(),
                channel,
                "No execution context to capture, dispatches to this subscriber will be dropped"
            );
        }

        let handler_name = handler.name().to_string();
        let handler: Handler<T> = Arc::new(handler);
        let subscription = Arc::new(Subscription::new(channel, handler, policy, context));

        let list = self.inner.channels.bucket(channel);
        list.push(subscription.clone());

        debug!(
            subscription_id = %subscription.id(),
            event_type = T::event_type(),
            channel,
            %policy,
            handler_name = %handler_name,
            has_context = subscription.context().is_some(),
            "Subscribed async handler"
        );

        SubscriptionToken::new(&list, subscription.id(), channel)
    }

    /// Publish on the default channel
    pub async fn publish(&self, event: T) -> Result<()> {
        self.publish_on(DEFAULT_CHANNEL, event).await
    }

    /// Publish on a named channel.
    ///
    /// Resolves once every `PublishThread` handler in the pass has finished.
    /// The first of those to fail aborts the pass.
    pub async fn publish_on(&self, channel: &str, event: T) -> Result<()> {
        let list = self.inner.channels.bucket(channel);
        let snapshot = list.snapshot();
        self.inner.counters.published();

        trace!(
            event_type = T::event_type(),
            channel,
            subscribers = snapshot.len(),
            "Publishing event"
        );

        let mut delivered = 0usize;
        for subscription in snapshot.iter().rev() {
            if !subscription.is_active() {
                trace!(subscription_id = %subscription.id(), "Skipping removed subscription");
                continue;
            }
            if self.dispatch(subscription, event.clone()).await? != Dispatch::Dropped {
                delivered += 1;
            }
        }

        trace!(event_type = T::event_type(), channel, delivered, "Event published");
        Ok(())
    }

    async fn dispatch(&self, subscription: &Arc<AsyncSubscription<T>>, event: T) -> Result<Dispatch> {
        let counters = &self.inner.counters;

        match subscription.policy() {
            DispatchPolicy::PublishThread => {
                counters.invoked();
                subscription.handler().handle(event).await.map_err(|e| {
                    counters.failed();
                    e.attribute(subscription.channel(), subscription.id())
                })?;
                Ok(Dispatch::Completed)
            }
            DispatchPolicy::CallerContext => {
                let Some(context) = subscription.context() else {
                    counters.dropped();
                    trace!(subscription_id = %subscription.id(), "No captured context, dispatch dropped");
                    return Ok(Dispatch::Dropped);
                };
                let task = background_task(subscription.clone(), event, counters.clone());
                Ok(schedule(context.as_ref(), task, subscription, counters))
            }
            DispatchPolicy::NewTask => {
                let task = background_task(subscription.clone(), event, counters.clone());
                Ok(schedule(self.inner.pool.as_ref(), task, subscription, counters))
            }
        }
    }

    /// Number of subscribers on a channel name
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner.channels.subscriber_count(channel)
    }

    /// Every channel name seen so far
    pub fn channel_names(&self) -> Vec<String> {
        self.inner.channels.names()
    }

    /// Statistics for this channel
    pub fn stats(&self) -> ChannelStats {
        self.inner.counters.snapshot(&self.inner.channels)
    }

    /// Whether two handles refer to the same channel instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn schedule<T: Event>(
    executor: &dyn Executor,
    task: BoxFuture<'static, ()>,
    subscription: &AsyncSubscription<T>,
    counters: &Counters,
) -> Dispatch {
    match executor.spawn(task) {
        Ok(()) => Dispatch::Scheduled,
        Err(e) => {
            counters.dropped();
            trace!(
                subscription_id = %subscription.id(),
                policy = %subscription.policy(),
                error = %e,
                "Dispatch dropped"
            );
            Dispatch::Dropped
        }
    }
}

fn background_task<T: Event>(
    subscription: Arc<AsyncSubscription<T>>,
    event: T,
    counters: Arc<Counters>,
) -> BoxFuture<'static, ()> {
    async move {
        counters.invoked();
        if let Err(e) = subscription.handler().handle(event).await {
            counters.failed();
            error!(
                subscription_id = %subscription.id(),
                event_type = T::event_type(),
                channel = subscription.channel(),
                policy = %subscription.policy(),
                error = %e,
                "Async handler failed"
            );
        }
    }
    .boxed()
}

impl<T: Event> Clone for AsyncEventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Event> fmt::Debug for AsyncEventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEventChannel")
            .field("event_type", &T::event_type())
            .field("channels", &self.inner.channels.len())
            .field("subscriptions", &self.inner.channels.total_subscribers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EventLoop;
    use crate::dispatcher::WorkerConfig;
    use crate::Error;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone)]
    struct TestEvent {
        value: u32,
    }

    fn channel() -> AsyncEventChannel<TestEvent> {
        let pool = WorkerPool::from_config(WorkerConfig::new().num_workers(2), None);
        AsyncEventChannel::new(Arc::new(pool), true)
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: &str) {
        log.lock().push(entry.to_string());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_caller_context_is_logged() {
        let channel = channel();
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer({
                let buffer = buffer.clone();
                move || buffer.clone()
            })
            .finish();

        let _token = tracing::subscriber::with_default(subscriber, || {
            channel.subscribe(|_: TestEvent| async { Ok(()) }, DispatchPolicy::CallerContext)
        });

        let output = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert!(output.contains("No execution context to capture"));
        assert_eq!(channel.subscriber_count(DEFAULT_CHANNEL), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let channel = channel();
        channel.publish(TestEvent { value: 1 }).await.unwrap();
        channel.publish_on("empty", TestEvent { value: 2 }).await.unwrap();
        assert_eq!(channel.stats().events_published, 2);
    }

    #[tokio::test]
    async fn test_publish_thread_handlers_awaited_in_reverse_order() {
        let channel = channel();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = log.clone();
        let _a = channel.subscribe(
            move |_| {
                let log = slow_log.clone();
                async move {
                    push(&log, "a:start");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    push(&log, "a:end");
                    Ok(())
                }
            },
            DispatchPolicy::PublishThread,
        );

        let fast_log = log.clone();
        let _b = channel.subscribe(
            move |_| {
                let log = fast_log.clone();
                async move {
                    push(&log, "b:start");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    push(&log, "b:end");
                    Ok(())
                }
            },
            DispatchPolicy::PublishThread,
        );

        channel.publish(TestEvent { value: 1 }).await.unwrap();

        assert_eq!(*log.lock(), vec!["b:start", "b:end", "a:start", "a:end"]);
    }

    #[tokio::test]
    async fn test_failing_async_handler_aborts_pass() {
        let channel = channel();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let first_log = log.clone();
        let _s1 = channel.subscribe(
            move |_| {
                let log = first_log.clone();
                async move {
                    push(&log, "s1");
                    Ok(())
                }
            },
            DispatchPolicy::PublishThread,
        );
        let s2 = channel.subscribe(
            |_| async { Err(Error::handler("s2 failed")) },
            DispatchPolicy::PublishThread,
        );

        let err = channel.publish(TestEvent { value: 1 }).await.unwrap_err();
        assert!(matches!(err, Error::Handler { subscription, .. } if subscription == s2.id()));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let channel = channel();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let token_log = log.clone();
        let token = channel.subscribe(
            move |event: TestEvent| {
                let log = token_log.clone();
                async move {
                    push(&log, &event.value.to_string());
                    Ok(())
                }
            },
            DispatchPolicy::PublishThread,
        );

        channel.publish(TestEvent { value: 1 }).await.unwrap();
        assert!(token.unsubscribe());
        assert!(!token.unsubscribe());
        channel.publish(TestEvent { value: 2 }).await.unwrap();

        assert_eq!(*log.lock(), vec!["1"]);
        assert_eq!(channel.subscriber_count(DEFAULT_CHANNEL), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_task_is_not_awaited() {
        let channel = channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));
        let (done_tx, done_rx) = oneshot::channel::<u32>();
        let done_tx = Arc::new(Mutex::new(Some(done_tx)));

        let _token = channel.subscribe(
            move |event: TestEvent| {
                let release = release_rx.lock().take();
                let done = done_tx.lock().take();
                async move {
                    if let Some(release) = release {
                        let _ = release.await;
                    }
                    if let Some(done) = done {
                        let _ = done.send(event.value);
                    }
                    Ok(())
                }
            },
            DispatchPolicy::NewTask,
        );

        // returns while the handler is still parked on `release`
        channel.publish(TestEvent { value: 3 }).await.unwrap();
        release_tx.send(()).unwrap();

        let value = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_caller_context_falls_back_to_runtime() {
        let channel = channel();
        let (tx, rx) = oneshot::channel::<u32>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let _token = channel.subscribe(
            move |event: TestEvent| {
                let tx = tx.lock().take();
                async move {
                    if let Some(tx) = tx {
                        let _ = tx.send(event.value);
                    }
                    Ok(())
                }
            },
            DispatchPolicy::CallerContext,
        );

        channel.publish(TestEvent { value: 8 }).await.unwrap();
        let value = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 8);
    }

    #[tokio::test]
    async fn test_caller_context_on_event_loop() {
        let channel = channel();
        let mut event_loop = EventLoop::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let token = {
            let _guard = context::enter(event_loop.executor());
            let log = log.clone();
            channel.subscribe(
                move |event: TestEvent| {
                    let log = log.clone();
                    async move {
                        push(&log, &event.value.to_string());
                        Ok(())
                    }
                },
                DispatchPolicy::CallerContext,
            )
        };

        channel.publish(TestEvent { value: 4 }).await.unwrap();
        assert!(log.lock().is_empty());

        assert_eq!(event_loop.run_pending(), 1);
        assert_eq!(*log.lock(), vec!["4"]);

        drop(event_loop);
        channel.publish(TestEvent { value: 5 }).await.unwrap();
        assert_eq!(channel.stats().dropped_dispatches, 1);
        drop(token);
    }

    #[tokio::test]
    async fn test_self_unsubscribe_during_publish() {
        let channel = channel();
        let calls = Arc::new(Mutex::new(0u32));

        let slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let calls_clone = calls.clone();
        let token = channel.subscribe(
            move |_| {
                *calls_clone.lock() += 1;
                if let Some(token) = slot_clone.lock().as_ref() {
                    token.unsubscribe();
                }
                async { Ok(()) }
            },
            DispatchPolicy::PublishThread,
        );
        *slot.lock() = Some(token);

        channel.publish(TestEvent { value: 1 }).await.unwrap();
        channel.publish(TestEvent { value: 2 }).await.unwrap();

        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_named_channels_are_isolated() {
        let channel = channel();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        for name in ["left", "right"] {
            let log = log.clone();
            channel
                .subscribe_on(
                    name,
                    move |_| {
                        let log = log.clone();
                        async move {
                            push(&log, name);
                            Ok(())
                        }
                    },
                    DispatchPolicy::PublishThread,
                )
                .detach();
        }

        channel.publish_on("right", TestEvent { value: 1 }).await.unwrap();
        channel.publish(TestEvent { value: 2 }).await.unwrap();

        assert_eq!(*log.lock(), vec!["right"]);
        assert_eq!(channel.subscriber_count("left"), 1);
    }
}
