//! Application Services
//!
//! - `coordinator`: per-widget refresh scheduling with coalescing
//! - `widget`: mount/unmount binding of a refresh source to feed topics

pub mod coordinator;
pub mod widget;

pub use coordinator::{RefreshConfig, RefreshHandle, RefreshNotifier, activate};
pub use widget::{LiveWidget, WidgetSpec};
