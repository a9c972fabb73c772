//! Port Interfaces
//!
//! Defines the contracts that data adapters implement so the refresh
//! coordinator can stay independent of where a widget's data comes from.
//!
//! ## Driven Ports (Outbound)
//!
//! - `RefreshSource`: fetches a widget's complete result set
//!
//! ## Driver Ports (Inbound)
//!
//! - `StatusProbe`: read-only widget status for the health endpoint
//!
//! The REST client provides `ResourceSource`; tests and ad-hoc widgets use
//! `FnSource` to wrap an async closure.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::refresh::{RefreshError, RefreshPhase, WidgetState};

// =============================================================================
// Refresh Source
// =============================================================================

/// Something that can produce a widget's data on demand.
///
/// Each call fetches the complete result set; the coordinator guarantees
/// calls on one source are never concurrent.
#[cfg_attr(test, mockall::automock(type Snapshot = Vec<String>;))]
#[async_trait]
pub trait RefreshSource: Send + Sync + 'static {
    /// Result set type.
    type Snapshot: Send + Sync + 'static;

    /// Fetch the current result set.
    async fn fetch(&self) -> Result<Self::Snapshot, RefreshError>;
}

// =============================================================================
// Closure Adapter
// =============================================================================

/// Adapts an async closure into a [`RefreshSource`].
///
/// ```rust
/// use dashboard_sync::application::ports::FnSource;
/// use dashboard_sync::domain::refresh::RefreshError;
///
/// let source = FnSource::new(|| async { Ok::<_, RefreshError>(vec![1, 2, 3]) });
/// # let _ = source;
/// ```
pub struct FnSource<F> {
    fetch: F,
}

impl<F> FnSource<F> {
    /// Wrap a closure.
    pub const fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, T> RefreshSource for FnSource<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RefreshError>> + Send + 'static,
    T: Send + Sync + 'static,
{
    type Snapshot = T;

    async fn fetch(&self) -> Result<T, RefreshError> {
        (self.fetch)().await
    }
}

// =============================================================================
// Status Probe
// =============================================================================

/// Point-in-time summary of one widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetStatus {
    /// Widget name.
    pub name: String,
    /// Whether a fetch is in flight.
    pub fetching: bool,
    /// Whether any data has been fetched.
    pub has_data: bool,
    /// Errors from the most recent failed fetch.
    pub errors: Vec<String>,
    /// Successful fetches so far.
    pub completed_fetches: u64,
    /// Failed fetches so far.
    pub failed_fetches: u64,
    /// When data was last replaced.
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl WidgetStatus {
    /// Summarize a widget state.
    #[must_use]
    pub fn from_state<T>(name: &str, state: &WidgetState<T>) -> Self {
        Self {
            name: name.to_string(),
            fetching: state.phase == RefreshPhase::Fetching,
            has_data: state.has_data(),
            errors: state.errors.clone(),
            completed_fetches: state.completed_fetches,
            failed_fetches: state.failed_fetches,
            last_refreshed_at: state.last_refreshed_at,
        }
    }
}

/// Read access to a widget's status without knowing its data type.
pub trait StatusProbe: Send + Sync {
    /// Current status.
    fn status(&self) -> WidgetStatus;
}

// =============================================================================
// Tests
// =============================================================================
