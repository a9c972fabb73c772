//! Refresh Coordinator
//!
//! Drives one widget's [`RefreshSource`]: an immediate fetch on activation,
//! a poll every interval measured from the end of the previous fetch, and
//! out-of-band fetches for pushed events and user actions. At most one fetch
//! is in flight; triggers that arrive meanwhile collapse into a single
//! trailing re-fetch.
//!
//! State is published through a `watch` channel so any number of readers can
//! observe the widget without locking. Once deactivated, the worker stops
//! and discards whatever the in-flight fetch would have produced.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::RefreshSource;
use crate::domain::refresh::{RefreshMachine, RefreshTrigger, WidgetState};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Refresh settings for one widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Widget name used in logs and metrics.
    pub name: String,
    /// Poll interval. `Duration::ZERO` disables polling.
    pub interval: Duration,
}

impl RefreshConfig {
    /// Create a refresh configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }

    /// Configuration without periodic polling.
    #[must_use]
    pub fn push_only(name: impl Into<String>) -> Self {
        Self::new(name, Duration::ZERO)
    }
}

// =============================================================================
// Activation
// =============================================================================

/// Start coordinating refreshes for a source.
///
/// The first fetch is started immediately. Must be called inside a tokio
/// runtime.
pub fn activate<S: RefreshSource>(source: S, config: RefreshConfig) -> RefreshHandle<S::Snapshot> {
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let (state_tx, _) = watch::channel(WidgetState::default());
    let state = Arc::new(state_tx);
    let cancel = CancellationToken::new();

    tracing::debug!(
        widget = %config.name,
        interval_secs = config.interval.as_secs_f64(),
        "Activating refresh coordinator"
    );

    let worker = Worker {
        source,
        config: config.clone(),
        triggers: trigger_rx,
        state: Arc::clone(&state),
        cancel: cancel.clone(),
        machine: RefreshMachine::new(),
    };
    tokio::spawn(worker.run());

    RefreshHandle {
        name: config.name,
        notifier: RefreshNotifier {
            trigger_tx,
            cancel: cancel.clone(),
        },
        state,
        cancel,
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Cloneable sender of refresh triggers.
///
/// Event forwarders hold one of these; it does not keep the widget alive.
#[derive(Debug, Clone)]
pub struct RefreshNotifier {
    trigger_tx: mpsc::UnboundedSender<RefreshTrigger>,
    cancel: CancellationToken,
}

impl RefreshNotifier {
    /// Request a refresh. Returns `false` once the widget is deactivated.
    pub fn trigger(&self, trigger: RefreshTrigger) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.trigger_tx.send(trigger).is_ok()
    }

    /// A pushed event arrived for the widget.
    pub fn notify_event(&self) -> bool {
        self.trigger(RefreshTrigger::EventReceived)
    }

    /// The user asked for fresh data.
    pub fn refresh(&self) -> bool {
        self.trigger(RefreshTrigger::UserAction)
    }
}

/// Owner handle of an activated coordinator.
///
/// Dropping the handle deactivates the widget.
#[derive(Debug)]
pub struct RefreshHandle<T> {
    name: String,
    notifier: RefreshNotifier,
    state: Arc<watch::Sender<WidgetState<T>>>,
    cancel: CancellationToken,
}

impl<T> RefreshHandle<T> {
    /// Widget name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request a user-initiated refresh.
    pub fn refresh(&self) -> bool {
        self.notifier.refresh()
    }

    /// Signal a pushed event.
    pub fn notify_event(&self) -> bool {
        self.notifier.notify_event()
    }

    /// Send an arbitrary trigger.
    pub fn trigger(&self, trigger: RefreshTrigger) -> bool {
        self.notifier.trigger(trigger)
    }

    /// A detached trigger sender.
    #[must_use]
    pub fn notifier(&self) -> RefreshNotifier {
        self.notifier.clone()
    }

    /// Current widget state.
    #[must_use]
    pub fn state(&self) -> WidgetState<T> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<WidgetState<T>> {
        self.state.subscribe()
    }

    /// Last successfully fetched data.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<T>> {
        self.state.borrow().snapshot.clone()
    }

    /// Errors from the most recent failed fetch.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.state.borrow().errors.clone()
    }

    /// Clear displayed errors without refetching.
    pub fn dismiss_errors(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_if_modified(|state| {
            let had_errors = !state.errors.is_empty();
            state.errors.clear();
            had_errors
        });
    }

    /// Whether the coordinator is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Token cancelled on deactivation.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop polling and discard any in-flight result.
    pub fn deactivate(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(widget = %self.name, "Deactivating refresh coordinator");
            self.cancel.cancel();
        }
    }
}

impl<T> Drop for RefreshHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker<S: RefreshSource> {
    source: S,
    config: RefreshConfig,
    triggers: mpsc::UnboundedReceiver<RefreshTrigger>,
    state: Arc<watch::Sender<WidgetState<S::Snapshot>>>,
    cancel: CancellationToken,
    machine: RefreshMachine,
}

impl<S: RefreshSource> Worker<S> {
    async fn run(mut self) {
        let interval = self.config.interval;
        let mut next = self.machine.trigger(RefreshTrigger::Initial);

        loop {
            while let Some(trigger) = next {
                if !self.fetch(trigger).await {
                    return;
                }
                next = self.machine.complete();
            }

            let poll = async move {
                if interval.is_zero() {
                    std::future::pending::<()>().await;
                } else {
                    tokio::time::sleep(interval).await;
                }
            };

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => next = self.machine.trigger(trigger),
                    None => break,
                },
                () = poll => next = self.machine.trigger(RefreshTrigger::IntervalElapsed),
            }
        }

        tracing::debug!(widget = %self.config.name, "Refresh coordinator stopped");
    }

    /// Run one fetch, absorbing triggers that arrive meanwhile.
    ///
    /// Returns `false` when the widget was deactivated before completion.
    async fn fetch(&mut self, trigger: RefreshTrigger) -> bool {
        let name = self.config.name.as_str();
        tracing::debug!(widget = %name, trigger = %trigger, "Fetching");
        metrics::record_refresh(name, trigger);
        self.state.send_modify(|state| state.begin(trigger));

        let started = Instant::now();
        let mut fetch = self.source.fetch();

        let result = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::debug!(widget = %name, "Discarding in-flight fetch");
                    return false;
                }
                result = &mut fetch => break result,
                Some(late) = self.triggers.recv() => Self::coalesce(&mut self.machine, name, late),
            }
        };

        // Triggers queued in the same wake-up as the result still belong to this fetch.
        while let Ok(late) = self.triggers.try_recv() {
            Self::coalesce(&mut self.machine, name, late);
        }

        if self.cancel.is_cancelled() {
            return false;
        }

        metrics::record_refresh_duration(name, started.elapsed());
        match result {
            Ok(snapshot) => {
                self.state.send_modify(|state| state.succeed(snapshot));
            }
            Err(e) => {
                tracing::warn!(widget = %name, error = %e, "Refresh failed");
                metrics::record_refresh_failure(name);
                self.state.send_modify(|state| state.fail(e));
            }
        }
        true
    }

    fn coalesce(machine: &mut RefreshMachine, name: &str, late: RefreshTrigger) {
        machine.trigger(late);
        metrics::record_refresh_coalesced(name);
        tracing::trace!(widget = %name, trigger = %late, "Trigger coalesced");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockRefreshSource;
    use crate::domain::refresh::{RefreshError, RefreshPhase};

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_on_activation() {
        let mut source = MockRefreshSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|| Ok(vec!["AAPL".to_string()]));

        let handle = activate(source, RefreshConfig::push_only("symbols"));
        let mut rx = handle.subscribe_state();
        rx.wait_for(|s| s.completed_fetches == 1).await.unwrap();

        assert_eq!(
            handle.snapshot().as_deref(),
            Some(&vec!["AAPL".to_string()])
        );
        assert_eq!(handle.state().last_trigger, Some(RefreshTrigger::Initial));
        assert_eq!(handle.state().phase, RefreshPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_stores_errors_and_can_be_dismissed() {
        let mut source = MockRefreshSource::new();
        source
            .expect_fetch()
            .returning(|| Err(RefreshError::message("server unavailable")));

        let handle = activate(source, RefreshConfig::push_only("orders"));
        let mut rx = handle.subscribe_state();
        rx.wait_for(|s| s.failed_fetches == 1).await.unwrap();

        assert_eq!(handle.errors(), vec!["server unavailable".to_string()]);
        assert!(handle.snapshot().is_none());

        handle.dismiss_errors();
        assert!(handle.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn user_refresh_triggers_fetch() {
        let mut source = MockRefreshSource::new();
        source.expect_fetch().times(2).returning(|| Ok(vec![]));

        let handle = activate(source, RefreshConfig::push_only("fees"));
        let mut rx = handle.subscribe_state();
        rx.wait_for(|s| s.completed_fetches == 1).await.unwrap();

        assert!(handle.refresh());
        rx.wait_for(|s| s.completed_fetches == 2).await.unwrap();
        assert_eq!(handle.state().last_trigger, Some(RefreshTrigger::UserAction));
    }

    #[tokio::test(start_paused = true)]
    async fn deactivated_handle_rejects_triggers() {
        let mut source = MockRefreshSource::new();
        source.expect_fetch().returning(|| Ok(vec![]));

        let handle = activate(source, RefreshConfig::new("bbo", Duration::from_secs(5)));
        let notifier = handle.notifier();
        handle.deactivate();

        assert!(!handle.is_active());
        assert!(!handle.refresh());
        assert!(!notifier.notify_event());
    }
}
