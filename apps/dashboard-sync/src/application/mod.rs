//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the refresh coordinator and live widget binding, plus
//! the port through which widgets fetch their data.

/// Port interfaces for data sources.
pub mod ports;

/// Refresh coordination and widget lifecycle services.
pub mod services;
