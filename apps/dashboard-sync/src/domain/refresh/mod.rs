//! Refresh State Machine
//!
//! A widget alternates between `Idle` and `Fetching`. Triggers that arrive
//! while a fetch is in flight set a pending flag instead of starting a
//! parallel request; when the fetch completes the pending trigger starts
//! exactly one trailing re-fetch.
//!
//! ```text
//! Idle --trigger--> Fetching --complete--> Idle
//!                     |  ^
//!           trigger   |  | complete (pending set)
//!                     v  |
//!               Fetching + pending
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

// =============================================================================
// Triggers and Phases
// =============================================================================

/// Reason a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
    /// First fetch on activation.
    Initial,
    /// Poll interval elapsed since the previous fetch finished.
    IntervalElapsed,
    /// A pushed event on one of the widget's topics.
    EventReceived,
    /// Explicit refresh requested by the user.
    UserAction,
}

impl RefreshTrigger {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::IntervalElapsed => "interval",
            Self::EventReceived => "event",
            Self::UserAction => "user",
        }
    }
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch phase of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPhase {
    /// No request outstanding.
    #[default]
    Idle,
    /// One request in flight.
    Fetching,
}

// =============================================================================
// Refresh Machine
// =============================================================================

/// Non-overlap and coalescing rules for one widget.
#[derive(Debug, Default)]
pub struct RefreshMachine {
    phase: RefreshPhase,
    pending: Option<RefreshTrigger>,
    coalesced: u64,
}

impl RefreshMachine {
    /// Create an idle machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a trigger.
    ///
    /// Returns `Some(trigger)` when a fetch should start now. While a fetch
    /// is in flight the trigger is recorded as pending and `None` is
    /// returned; the latest pending trigger wins.
    pub fn trigger(&mut self, trigger: RefreshTrigger) -> Option<RefreshTrigger> {
        match self.phase {
            RefreshPhase::Idle => {
                self.phase = RefreshPhase::Fetching;
                Some(trigger)
            }
            RefreshPhase::Fetching => {
                self.pending = Some(trigger);
                self.coalesced += 1;
                None
            }
        }
    }

    /// Mark the in-flight fetch as finished.
    ///
    /// Returns the pending trigger when a trailing fetch should start
    /// immediately, otherwise the machine goes back to idle.
    pub fn complete(&mut self) -> Option<RefreshTrigger> {
        if let Some(next) = self.pending.take() {
            self.phase = RefreshPhase::Fetching;
            return Some(next);
        }
        self.phase = RefreshPhase::Idle;
        None
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> RefreshPhase {
        self.phase
    }

    /// Whether a trailing fetch is queued.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Total triggers absorbed while fetching.
    #[must_use]
    pub const fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

// =============================================================================
// Refresh Error
// =============================================================================

/// A failed refresh, as a list of user-displayable messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .messages.join("; "))]
pub struct RefreshError {
    /// Messages to display.
    pub messages: Vec<String>,
}

impl RefreshError {
    /// Error with several messages.
    #[must_use]
    pub const fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    /// Error with a single message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

// =============================================================================
// Widget State
// =============================================================================

/// Observable state of one live widget.
///
/// The snapshot is replaced wholesale on every successful fetch and kept
/// across failures. `None` means no data has been fetched yet.
#[derive(Debug)]
pub struct WidgetState<T> {
    /// Current fetch phase.
    pub phase: RefreshPhase,
    /// Last successfully fetched data.
    pub snapshot: Option<Arc<T>>,
    /// Errors from the most recent failed fetch.
    pub errors: Vec<String>,
    /// Number of successful fetches.
    pub completed_fetches: u64,
    /// Number of failed fetches.
    pub failed_fetches: u64,
    /// Trigger of the most recent fetch.
    pub last_trigger: Option<RefreshTrigger>,
    /// When the snapshot was last replaced.
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl<T> Default for WidgetState<T> {
    fn default() -> Self {
        Self {
            phase: RefreshPhase::Idle,
            snapshot: None,
            errors: Vec::new(),
            completed_fetches: 0,
            failed_fetches: 0,
            last_trigger: None,
            last_refreshed_at: None,
        }
    }
}

impl<T> Clone for WidgetState<T> {
    fn clone(&self) -> Self {
        Self {
            phase: self.phase,
            snapshot: self.snapshot.clone(),
            errors: self.errors.clone(),
            completed_fetches: self.completed_fetches,
            failed_fetches: self.failed_fetches,
            last_trigger: self.last_trigger,
            last_refreshed_at: self.last_refreshed_at,
        }
    }
}

impl<T> WidgetState<T> {
    /// Enter `Fetching` for the given trigger.
    pub const fn begin(&mut self, trigger: RefreshTrigger) {
        self.phase = RefreshPhase::Fetching;
        self.last_trigger = Some(trigger);
    }

    /// Record a successful fetch. Clears previous errors.
    pub fn succeed(&mut self, snapshot: T) {
        self.phase = RefreshPhase::Idle;
        self.snapshot = Some(Arc::new(snapshot));
        self.errors.clear();
        self.completed_fetches += 1;
        self.last_refreshed_at = Some(Utc::now());
    }

    /// Record a failed fetch. The previous snapshot is kept.
    pub fn fail(&mut self, error: RefreshError) {
        self.phase = RefreshPhase::Idle;
        self.errors = error.messages;
        self.failed_fetches += 1;
    }

    /// Whether a fetch is in flight.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.phase == RefreshPhase::Fetching
    }

    /// Whether any data has been fetched.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Whether the last fetch left errors to display.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_trigger_starts_fetch() {
        let mut machine = RefreshMachine::new();

        assert_eq!(
            machine.trigger(RefreshTrigger::Initial),
            Some(RefreshTrigger::Initial)
        );
        assert_eq!(machine.phase(), RefreshPhase::Fetching);
    }

    #[test]
    fn triggers_while_fetching_collapse_to_one_trailing_fetch() {
        let mut machine = RefreshMachine::new();
        machine.trigger(RefreshTrigger::Initial);

        for _ in 0..5 {
            assert_eq!(machine.trigger(RefreshTrigger::EventReceived), None);
        }
        assert_eq!(machine.trigger(RefreshTrigger::UserAction), None);
        assert!(machine.is_pending());
        assert_eq!(machine.coalesced(), 6);

        // Latest pending trigger wins
        assert_eq!(machine.complete(), Some(RefreshTrigger::UserAction));
        assert_eq!(machine.phase(), RefreshPhase::Fetching);

        assert_eq!(machine.complete(), None);
        assert_eq!(machine.phase(), RefreshPhase::Idle);
    }

    #[test]
    fn complete_without_pending_goes_idle() {
        let mut machine = RefreshMachine::new();
        machine.trigger(RefreshTrigger::IntervalElapsed);

        assert_eq!(machine.complete(), None);
        assert!(!machine.is_pending());
        assert_eq!(
            machine.trigger(RefreshTrigger::IntervalElapsed),
            Some(RefreshTrigger::IntervalElapsed)
        );
    }

    #[test]
    fn refresh_error_display_joins_messages() {
        let err = RefreshError::new(vec!["timeout".into(), "retry later".into()]);
        assert_eq!(err.to_string(), "timeout; retry later");
        assert_eq!(RefreshError::message("x").messages, vec!["x".to_string()]);
    }

    #[test]
    fn widget_state_keeps_snapshot_across_failures() {
        let mut state: WidgetState<Vec<u32>> = WidgetState::default();
        assert!(!state.has_data());

        state.begin(RefreshTrigger::Initial);
        assert!(state.is_fetching());
        state.succeed(vec![1, 2, 3]);
        assert_eq!(state.completed_fetches, 1);
        assert!(state.last_refreshed_at.is_some());

        state.begin(RefreshTrigger::IntervalElapsed);
        state.fail(RefreshError::message("boom"));
        assert_eq!(state.snapshot.as_deref(), Some(&vec![1, 2, 3]));
        assert_eq!(state.errors, vec!["boom".to_string()]);
        assert_eq!(state.failed_fetches, 1);
        assert!(!state.is_fetching());

        state.begin(RefreshTrigger::EventReceived);
        state.succeed(vec![4]);
        assert!(!state.has_errors());
        assert_eq!(state.last_trigger, Some(RefreshTrigger::EventReceived));
    }

    #[test]
    fn widget_state_clone_does_not_require_clone_payload() {
        struct Opaque;

        let mut state: WidgetState<Opaque> = WidgetState::default();
        state.succeed(Opaque);
        let copy = state.clone();

        assert!(Arc::ptr_eq(
            state.snapshot.as_ref().unwrap(),
            copy.snapshot.as_ref().unwrap()
        ));
    }
}
