//! Core event trait and channel naming.
//!
//! Any value that is cloneable, thread-safe and `'static` can travel over a
//! channel. Each subscriber receives its own clone of the published value.

/// Name of the channel used when callers do not pick one.
///
/// Shaped like a GUID so it never collides with a caller-chosen name.
pub const DEFAULT_CHANNEL: &str = "{5466872F-B015-4CE0-A640-6FBE2A986B1F}";

/// Marker trait for values that can be published.
///
/// Automatically implemented for every `Clone + Send + Sync + 'static` type.
///
/// # Example
///
/// ```rust
/// use tokio_channels::Event;
///
/// #[derive(Debug, Clone)]
/// struct ButtonClicked {
///     id: u32,
/// }
///
/// assert!(ButtonClicked::event_type().ends_with("ButtonClicked"));
/// ```
pub trait Event: Clone + Send + Sync + 'static {
    /// Human-readable name of the event type, used in log records.
    fn event_type() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

impl<T: Clone + Send + Sync + 'static> Event for T {}
