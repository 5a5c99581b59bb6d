//! Event handler traits and implementations.

use crate::{Event, Result};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// A synchronous subscriber.
///
/// Returning `Err` from a `PublishThread` subscription aborts the publish
/// pass and surfaces from `publish`; for the other policies the error is
/// logged.
pub trait EventHandler<T: Event>: Send + Sync + 'static {
    /// Process one event
    fn handle(&self, event: T) -> Result<()>;

    /// Get the handler name for debugging
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// An asynchronous subscriber.
#[async_trait]
pub trait AsyncEventHandler<T: Event>: Send + Sync + 'static {
    /// Process one event
    async fn handle(&self, event: T) -> Result<()>;

    /// Get the handler name for debugging
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A closure-based synchronous handler.
pub struct FunctionHandler<T, F> {
    function: F,
    name: String,
    _phantom: PhantomData<fn(T)>,
}

impl<T, F> FunctionHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<()> + Send + Sync + 'static,
{
    /// Create a new function handler
    pub fn new(function: F) -> Self {
        Self::with_name(function, format!("FunctionHandler<{}>", T::event_type()))
    }

    /// Create a new function handler with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

impl<T, F> EventHandler<T> for FunctionHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, event: T) -> Result<()> {
        (self.function)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A closure-based asynchronous handler.
pub struct AsyncFunctionHandler<T, F> {
    function: F,
    name: String,
    _phantom: PhantomData<fn(T)>,
}

impl<T, F, Fut> AsyncFunctionHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    /// Create a new function handler
    pub fn new(function: F) -> Self {
        Self::with_name(function, format!("AsyncFunctionHandler<{}>", T::event_type()))
    }

    /// Create a new function handler with a custom name
    pub fn with_name(function: F, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> AsyncEventHandler<T> for AsyncFunctionHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: T) -> Result<()> {
        (self.function)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T, F> fmt::Debug for FunctionHandler<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandler").field("name", &self.name).finish()
    }
}

impl<T, F> fmt::Debug for AsyncFunctionHandler<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFunctionHandler").field("name", &self.name).finish()
    }
}

/// A handler that only sees events accepted by a predicate
pub struct FilteredHandler<H, P> {
    inner: H,
    predicate: P,
}

impl<H, P> FilteredHandler<H, P> {
    /// Wrap `inner` so it only runs when `predicate` holds
    pub fn new(inner: H, predicate: P) -> Self {
        Self { inner, predicate }
    }
}

impl<T, H, P> EventHandler<T> for FilteredHandler<H, P>
where
    T: Event,
    H: EventHandler<T>,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn handle(&self, event: T) -> Result<()> {
        if (self.predicate)(&event) {
            self.inner.handle(event)
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        EventHandler::name(&self.inner)
    }
}

#[async_trait]
impl<T, H, P> AsyncEventHandler<T> for FilteredHandler<H, P>
where
    T: Event,
    H: AsyncEventHandler<T>,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    async fn handle(&self, event: T) -> Result<()> {
        if (self.predicate)(&event) {
            self.inner.handle(event).await
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        AsyncEventHandler::name(&self.inner)
    }
}

impl<H: fmt::Debug, P> fmt::Debug for FilteredHandler<H, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredHandler").field("inner", &self.inner).finish()
    }
}
