//! Synchronous publish/subscribe for one event type.

use super::{ChannelMap, ChannelStats, Counters};
use crate::context::{self, Executor, Job};
use crate::dispatcher::{Dispatch, WorkerPool};
use crate::event::DEFAULT_CHANNEL;
use crate::subscription::{EventHandler, FunctionHandler, Subscription, SubscriptionToken};
use crate::{DispatchPolicy, Event, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace};

type Handler<T> = Arc<dyn EventHandler<T>>;
type SyncSubscription<T> = Subscription<Handler<T>>;

/// Publish/subscribe surface for events of type `T` with synchronous
/// handlers.
///
/// Cloning is cheap and every clone refers to the same subscribers. Obtain
/// the canonical instance for a bus with [`EventBus::channel`].
///
/// # Example
///
/// ```rust
/// use tokio_channels::{DispatchPolicy, EventBus};
///
/// #[derive(Debug, Clone)]
/// struct Saved(u32);
///
/// let bus = EventBus::new();
/// let channel = bus.channel::<Saved>();
///
/// let token = channel.subscribe(
///     |event: Saved| {
///         println!("saved {}", event.0);
///         Ok(())
///     },
///     DispatchPolicy::PublishThread,
/// );
///
/// channel.publish(Saved(1)).unwrap();
/// token.unsubscribe();
/// ```
///
/// [`EventBus::channel`]: crate::EventBus::channel
pub struct EventChannel<T: Event> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Event> {
    channels: ChannelMap<Handler<T>>,
    pool: Arc<WorkerPool>,
    counters: Arc<Counters>,
    runtime_fallback: bool,
}

impl<T: Event> EventChannel<T> {
    pub(crate) fn new(pool: Arc<WorkerPool>, runtime_fallback: bool) -> Self {
        debug!(event_type = T::event_type(), "Creating event channel");
        Self {
            inner: Arc::new(Inner {
                channels: ChannelMap::new(),
                pool,
                counters: Arc::new(Counters::default()),
                runtime_fallback,
            }),
        }
    }

    /// Subscribe a closure on the default channel
    pub fn subscribe<F>(&self, handler: F, policy: DispatchPolicy) -> SubscriptionToken
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_on(DEFAULT_CHANNEL, handler, policy)
    }

    /// Subscribe a closure on a named channel
    pub fn subscribe_on<F>(
        &self,
        channel: &str,
        handler: F,
        policy: DispatchPolicy,
    ) -> SubscriptionToken
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_handler_on(channel, FunctionHandler::new(handler), policy)
    }

    /// Subscribe a handler value on the default channel
    pub fn subscribe_handler<H>(&self, handler: H, policy: DispatchPolicy) -> SubscriptionToken
    where
        H: EventHandler<T>,
    {
        self.subscribe_handler_on(DEFAULT_CHANNEL, handler, policy)
    }

    /// Subscribe a handler value on a named channel.
    ///
    /// For [`DispatchPolicy::CallerContext`] the calling thread's execution
    /// context is captured now.
    pub fn subscribe_handler_on<H>(
        &self,
        channel: &str,
        handler: H,
        policy: DispatchPolicy,
    ) -> SubscriptionToken
    where
        H: EventHandler<T>,
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
            "Subscribed"
        );

        SubscriptionToken::new(&list, subscription.id(), channel)
    }

    /// Publish on the default channel
    pub fn publish(&self, event: T) -> Result<()> {
        self.publish_on(DEFAULT_CHANNEL, event)
    }

    /// Publish on a named channel.
    ///
    /// Subscribers are visited newest first. `PublishThread` handlers run
    /// before this returns and the first one to fail aborts the pass with
    /// its error; the other policies never fail the publisher.
    pub fn publish_on(&self, channel: &str, event: T) -> Result<()> {
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
            if self.dispatch(subscription, event.clone())? != Dispatch::Dropped {
                delivered += 1;
            }
        }

        trace!(event_type = T::event_type(), channel, delivered, "Event published");
        Ok(())
    }

    fn dispatch(&self, subscription: &Arc<SyncSubscription<T>>, event: T) -> Result<Dispatch> {
        let counters = &self.inner.counters;

        match subscription.policy() {
            DispatchPolicy::PublishThread => {
                counters.invoked();
                subscription.handler().handle(event).map_err(|e| {
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
                let job = background_job(subscription.clone(), event, counters.clone());
                Ok(schedule(context.as_ref(), job, subscription, counters))
            }
            DispatchPolicy::NewTask => {
                let job = background_job(subscription.clone(), event, counters.clone());
                Ok(schedule(self.inner.pool.as_ref(), job, subscription, counters))
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
    job: Job,
    subscription: &SyncSubscription<T>,
    counters: &Counters,
) -> Dispatch {
    match executor.execute(job) {
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

fn background_job<T: Event>(
    subscription: Arc<SyncSubscription<T>>,
    event: T,
    counters: Arc<Counters>,
) -> Job {
    Box::new(move || {
        counters.invoked();
        if let Err(e) = subscription.handler().handle(event) {
            counters.failed();
            error!(
                subscription_id = %subscription.id(),
                event_type = T::event_type(),
                channel = subscription.channel(),
                policy = %subscription.policy(),
                error = %e,
                "Handler failed"
            );
        }
    })
}

impl<T: Event> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Event> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
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
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct TestEvent {
        value: u32,
    }

    fn channel() -> EventChannel<TestEvent> {
        let pool = WorkerPool::new(WorkerConfig::new().num_workers(2));
        EventChannel::new(Arc::new(pool), false)
    }

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl Fn(TestEvent) -> Result<()> + Send + Sync + 'static {
        let log = log.clone();
        move |_| {
            log.lock().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let channel = channel();
        channel.publish(TestEvent { value: 1 }).unwrap();
        channel.publish_on("nobody-listens", TestEvent { value: 2 }).unwrap();

        let stats = channel.stats();
        assert_eq!(stats.events_published, 2);
        assert_eq!(stats.handler_invocations, 0);
        assert_eq!(stats.subscriptions, 0);
    }

    #[test]
    fn test_reverse_registration_order() {
        let channel = channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _s1 = channel.subscribe(recorder(&log, "s1"), DispatchPolicy::PublishThread);
        let _s2 = channel.subscribe(recorder(&log, "s2"), DispatchPolicy::PublishThread);
        let _s3 = channel.subscribe(recorder(&log, "s3"), DispatchPolicy::PublishThread);

        channel.publish(TestEvent { value: 1 }).unwrap();
        assert_eq!(*log.lock(), vec!["s3", "s2", "s1"]);
    }

    #[test]
    fn test_unsubscribed_handler_is_skipped() {
        let channel = channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _s1 = channel.subscribe(recorder(&log, "s1"), DispatchPolicy::PublishThread);
        let s2 = channel.subscribe(recorder(&log, "s2"), DispatchPolicy::PublishThread);
        let _s3 = channel.subscribe(recorder(&log, "s3"), DispatchPolicy::PublishThread);

        assert!(s2.unsubscribe());
        assert!(!s2.unsubscribe());

        channel.publish(TestEvent { value: 1 }).unwrap();
        assert_eq!(*log.lock(), vec!["s3", "s1"]);
    }

    #[test]
    fn test_failing_handler_aborts_pass() {
        let channel = channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _s1 = channel.subscribe(recorder(&log, "s1"), DispatchPolicy::PublishThread);
        let log_clone = log.clone();
        let s2 = channel.subscribe(
            move |_| {
                log_clone.lock().push("s2");
                Err(Error::handler("s2 failed"))
            },
            DispatchPolicy::PublishThread,
        );
        let _s3 = channel.subscribe(recorder(&log, "s3"), DispatchPolicy::PublishThread);

        let err = channel.publish(TestEvent { value: 1 }).unwrap_err();
        match &err {
            Error::Handler { subscription, .. } => assert_eq!(*subscription, s2.id()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), Error::HandlerFailed(msg) if msg == "s2 failed"));

        assert_eq!(*log.lock(), vec!["s3", "s2"]);
        assert_eq!(channel.stats().handler_failures, 1);
    }

    #[test]
    fn test_self_unsubscribe_during_publish() {
        let channel = channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _s1 = channel.subscribe(recorder(&log, "s1"), DispatchPolicy::PublishThread);

        let slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let log_clone = log.clone();
        let s2 = channel.subscribe(
            move |_| {
                log_clone.lock().push("s2");
                if let Some(token) = slot_clone.lock().as_ref() {
                    token.unsubscribe();
                }
                Ok(())
            },
            DispatchPolicy::PublishThread,
        );
        *slot.lock() = Some(s2);

        let _s3 = channel.subscribe(recorder(&log, "s3"), DispatchPolicy::PublishThread);

        channel.publish(TestEvent { value: 1 }).unwrap();
        assert_eq!(*log.lock(), vec!["s3", "s2", "s1"]);

        channel.publish(TestEvent { value: 2 }).unwrap();
        assert_eq!(*log.lock(), vec!["s3", "s2", "s1", "s3", "s1"]);
    }

    #[test]
    fn test_handler_removing_a_later_subscriber() {
        let channel = channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::new(channel.subscribe(recorder(&log, "s1"), DispatchPolicy::PublishThread));
        let _s2 = channel.subscribe(recorder(&log, "s2"), DispatchPolicy::PublishThread);

        let s1_clone = s1.clone();
        let log_clone = log.clone();
        let _s3 = channel.subscribe(
            move |_| {
                log_clone.lock().push("s3");
                s1_clone.unsubscribe();
                Ok(())
            },
            DispatchPolicy::PublishThread,
        );

        channel.publish(TestEvent { value: 1 }).unwrap();
        assert_eq!(*log.lock(), vec!["s3", "s2"]);
    }

    #[test]
    fn test_subscribe_during_publish_is_not_invoked() {
        let channel = channel();
        let count = Arc::new(AtomicUsize::new(0));
        let added = Arc::new(Mutex::new(Vec::new()));

        let inner_channel = channel.clone();
        let count_clone = count.clone();
        let added_clone = added.clone();
        let _outer = channel.subscribe(
            move |_| {
                let count = count_clone.clone();
                let token = inner_channel.subscribe(
                    move |_| {
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                    DispatchPolicy::PublishThread,
                );
                added_clone.lock().push(token);
                Ok(())
            },
            DispatchPolicy::PublishThread,
        );

        channel.publish(TestEvent { value: 1 }).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(channel.subscriber_count(DEFAULT_CHANNEL), 2);
    }

    #[test]
    fn test_named_channels_are_isolated() {
        let channel = channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _a = channel.subscribe_on("a", recorder(&log, "a"), DispatchPolicy::PublishThread);
        let _b = channel.subscribe_on("b", recorder(&log, "b"), DispatchPolicy::PublishThread);
        let _d = channel.subscribe(recorder(&log, "default"), DispatchPolicy::PublishThread);

        channel.publish_on("a", TestEvent { value: 1 }).unwrap();
        channel.publish(TestEvent { value: 2 }).unwrap();

        assert_eq!(*log.lock(), vec!["a", "default"]);

        let mut names = channel.channel_names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string(), DEFAULT_CHANNEL.to_string()]);
    }

    #[test]
    fn test_caller_context_runs_on_event_loop() {
        let channel = channel();
        let mut event_loop = EventLoop::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let token = {
            let _guard = context::enter(event_loop.executor());
            let seen = seen.clone();
            channel.subscribe(
                move |event: TestEvent| {
                    seen.lock().push((event.value, std::thread::current().id()));
                    Ok(())
                },
                DispatchPolicy::CallerContext,
            )
        };

        let publisher = channel.clone();
        std::thread::spawn(move || publisher.publish(TestEvent { value: 5 }).unwrap())
            .join()
            .unwrap();

        assert!(seen.lock().is_empty());
        assert_eq!(event_loop.run_pending(), 1);
        assert_eq!(*seen.lock(), vec![(5, std::thread::current().id())]);
        drop(token);
    }

    #[test]
    fn test_caller_context_without_context_is_dropped() {
        let channel = channel();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let _token = channel.subscribe(
            move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            DispatchPolicy::CallerContext,
        );

        channel.publish(TestEvent { value: 1 }).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(channel.stats().dropped_dispatches, 1);
    }

    #[test]
    fn test_caller_context_gone_is_dropped() {
        let channel = channel();
        let event_loop = EventLoop::new();
        let _token = {
            let _guard = context::enter(event_loop.executor());
            channel.subscribe(|_| Ok(()), DispatchPolicy::CallerContext)
        };
        drop(event_loop);

        channel.publish(TestEvent { value: 1 }).unwrap();
        assert_eq!(channel.stats().dropped_dispatches, 1);
    }

    #[test]
    fn test_new_task_runs_in_background() {
        let channel = channel();
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);

        let _token = channel.subscribe(
            move |event: TestEvent| {
                tx.lock().send((event.value, std::thread::current().id())).unwrap();
                Ok(())
            },
            DispatchPolicy::NewTask,
        );

        channel.publish(TestEvent { value: 9 }).unwrap();

        let (value, thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(value, 9);
        assert_ne!(thread, std::thread::current().id());
    }

    #[test]
    fn test_background_failure_does_not_reach_publisher() {
        let channel = channel();
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);

        let _failing = channel.subscribe(|_| Err(Error::handler("boom")), DispatchPolicy::NewTask);
        let _ok = channel.subscribe(
            move |_| {
                tx.lock().send(()).unwrap();
                Ok(())
            },
            DispatchPolicy::NewTask,
        );

        channel.publish(TestEvent { value: 1 }).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_concurrent_publish_and_unsubscribe() {
        let channel = channel();
        let deliveries = Arc::new(Mutex::new(HashSet::new()));
        let repeated = Arc::new(AtomicUsize::new(0));

        let tokens: Vec<_> = (0..32usize)
            .map(|subscriber| {
                let deliveries = deliveries.clone();
                let repeated = repeated.clone();
                channel.subscribe(
                    move |event: TestEvent| {
                        if !deliveries.lock().insert((event.value, subscriber)) {
                            repeated.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(())
                    },
                    DispatchPolicy::PublishThread,
                )
            })
            .collect();

        let publisher = {
            let channel = channel.clone();
            std::thread::spawn(move || {
                for value in 0..100 {
                    channel.publish(TestEvent { value }).unwrap();
                }
            })
        };
        let remover = std::thread::spawn(move || {
            for token in tokens {
                token.unsubscribe();
            }
        });

        publisher.join().unwrap();
        remover.join().unwrap();

        assert_eq!(channel.subscriber_count(DEFAULT_CHANNEL), 0);
        assert_eq!(repeated.load(Ordering::SeqCst), 0);
        assert!(deliveries.lock().len() <= 32 * 100);
    }

    #[test]
    fn test_caller_context_runtime_shut_down() {
        let pool = WorkerPool::new(WorkerConfig::new().num_workers(1));
        let channel = EventChannel::new(Arc::new(pool), true);
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let _token = runtime.block_on(async {
            let calls = calls.clone();
            channel.subscribe(
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                DispatchPolicy::CallerContext,
            )
        });
        drop(runtime);

        channel.publish(TestEvent { value: 1 }).unwrap();

        let stats = channel.stats();
        assert_eq!(stats.dropped_dispatches, 1);
        assert_eq!(stats.handler_invocations, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
