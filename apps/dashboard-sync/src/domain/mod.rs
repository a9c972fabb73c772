//! Domain Layer - Core dashboard types and pure logic.
//!
//! Formatting, filtering, table configuration, the feed event model, topic
//! bookkeeping and the refresh state machine. Nothing here performs I/O.

/// Live event kinds, topics and wire messages.
pub mod events;

/// Dataset filtering and dropdown option sets.
pub mod filter;

/// Number and date formatting.
pub mod format;

/// Refresh triggers, state machine and widget state.
pub mod refresh;

/// Reference-counted topic registry.
pub mod subscription;

/// Table column and filter configuration.
pub mod table;
