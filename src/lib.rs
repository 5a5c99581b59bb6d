//! # tokio-channels
//!
//! An in-process, type-indexed publish/subscribe bus.
//!
//! ## Features
//!
//! - One synchronous and one asynchronous channel per event type, created
//!   lazily and race-free
//! - Named channels inside each typed channel, plus a reserved default one
//! - Newest-subscriber-first delivery that tolerates subscribers leaving
//!   mid-publish
//! - Per-subscription dispatch: inline, on the subscriber's own execution
//!   context, or on a worker pool
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use tokio_channels::{DispatchPolicy, EventBus};
//!
//! #[derive(Debug, Clone)]
//! enum Button {
//!     Accept,
//!     Cancel,
//! }
//!
//! #[tokio::main]
//! async fn main() -> tokio_channels::Result<()> {
//!     let bus = EventBus::builder().build()?;
//!     let clicks = bus.async_channel::<Button>();
//!
//!     // Spawned on the current runtime, not awaited by the publisher
//!     let token = clicks.subscribe_on(
//!         "confirm-dialog",
//!         |button| async move {
//!             println!("confirm dialog closed with {button:?}");
//!             Ok(())
//!         },
//!         DispatchPolicy::CallerContext,
//!     );
//!
//!     clicks.publish_on("confirm-dialog", Button::Accept).await?;
//!     clicks.publish_on("other-dialog", Button::Cancel).await?;
//!
//!     // Dropping the token has the same effect
//!     token.unsubscribe();
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    unreachable_pub
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Core event trait and channel naming
pub mod event;

/// Error types and result aliases
pub mod error;

/// Execution contexts for `CallerContext` subscriptions
pub mod context;

/// Dispatch policies and the worker pool
pub mod dispatcher;

/// Subscriptions, subscriber lists and handler traits
pub mod subscription;

/// Typed channels
pub mod channel;

/// Type identity to channel instance registry
pub mod registry;

/// The main event bus implementation
pub mod bus;

// Re-export commonly used types
pub use bus::{global, EventBus, EventBusBuilder, EventBusConfig, EventBusStats};
pub use channel::{AsyncEventChannel, ChannelStats, EventChannel};
pub use dispatcher::DispatchPolicy;
pub use error::{Error, Result};
pub use event::{Event, DEFAULT_CHANNEL};
pub use subscription::{AsyncEventHandler, EventHandler, SubscriptionToken};

/// Prelude module for convenient imports
///
/// # Example
/// ```rust
/// use tokio_channels::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bus::{EventBus, EventBusBuilder};
    pub use crate::channel::{AsyncEventChannel, EventChannel};
    pub use crate::dispatcher::DispatchPolicy;
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, DEFAULT_CHANNEL};
    pub use crate::subscription::{AsyncEventHandler, EventHandler, SubscriptionToken};
}
