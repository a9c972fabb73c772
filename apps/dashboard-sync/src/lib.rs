#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Dashboard Sync - Live Data Synchronization Core
//!
//! Keeps dashboard widgets fresh: each widget fetches its data on mount,
//! re-fetches on a fixed interval, and re-fetches when the websocket feed
//! pushes an event it cares about. Overlapping triggers are coalesced so a
//! widget never runs two fetches at once.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure logic and data types
//!   - `events`: Feed message and payload types
//!   - `subscription`: Reference-counted topic registry
//!   - `refresh`: Refresh state machine and widget state
//!   - `filter`: Equality filters over tabular records
//!   - `format`: Number, date and lot-size precision formatting
//!   - `table`: Per-instance column and filter definitions
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `RefreshSource` and `StatusProbe`
//!   - `services`: Refresh coordinator and live widget mounting
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Websocket client with reconnect and topic replay
//!   - `api`: REST client and list-endpoint refresh sources
//!   - `export`: CSV and XLSX table export
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!  REST API ◄──── fetch ─────┐
//!                            │
//!  Event feed ──► FeedClient ──► event ──► RefreshCoordinator ──► WidgetState
//!                    ▲                          ▲   ▲
//!                    └── subscribe(topic) ──────┘   └── interval / user
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure types and logic with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::events::{BboStatistics, EventKind, LastSaleStatistics, LiveEvent, Topic};
pub use domain::filter::{FilterSet, Record, distinct_options, filter};
pub use domain::format::{DecimalSettings, decimals_from_lot_size, number_format};
pub use domain::refresh::{RefreshError, RefreshTrigger, WidgetState};
pub use domain::subscription::{ConsumerId, TopicRegistry};
pub use domain::table::{TableConfig, TableKind};

// Application services
pub use application::ports::{FnSource, RefreshSource, StatusProbe, WidgetStatus};
pub use application::services::{
    LiveWidget, RefreshConfig, RefreshHandle, RefreshNotifier, WidgetSpec, activate,
};

// Infrastructure
pub use infrastructure::api::{ApiClient, ApiError, Resource, ResourceSource};
pub use infrastructure::config::{ConfigError, DashboardConfig, FeedSettings};
pub use infrastructure::export::{ExportError, ExportFormat};
pub use infrastructure::feed::{
    ConnectionState, EventStream, FeedClient, FeedError, TopicSubscription,
};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
