//! Error types for the tokio-channels library.

use thiserror::Error;
use uuid::Uuid;

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tokio-channels
#[derive(Error, Debug)]
pub enum Error {
    /// A `PublishThread` handler failed while the publisher was waiting on it
    #[error("Handler {subscription} on channel '{channel}' failed: {source}")]
    Handler {
        /// Channel name the failing subscription was registered under
        channel: String,
        /// Identity of the failing subscription
        subscription: Uuid,
        /// The error returned by the handler
        #[source]
        source: Box<Error>,
    },

    /// Failure reported by a handler body
    #[error("Handler error: {0}")]
    HandlerFailed(String),

    /// The execution context captured for a subscription has shut down
    #[error("Execution context is no longer available")]
    ContextUnavailable,

    /// The worker pool could not be started
    #[error("Worker pool unavailable: {0}")]
    PoolUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Create a new handler error
    pub fn handler(msg: impl Into<String>) -> Self {
        Error::HandlerFailed(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::ConfigError(msg.into())
    }

    /// Check if this error came out of a subscriber's handler
    pub fn is_handler_error(&self) -> bool {
        matches!(self, Error::Handler { .. } | Error::HandlerFailed(_))
    }

    /// Check if this error indicates a vanished execution context
    pub fn is_context_unavailable(&self) -> bool {
        matches!(self, Error::ContextUnavailable)
    }

    /// The innermost error, unwrapping any handler attribution
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Handler { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn attribute(self, channel: &str, subscription: Uuid) -> Self {
        Error::Handler {
            channel: channel.to_string(),
            subscription,
            source: Box::new(self),
        }
    }
}
