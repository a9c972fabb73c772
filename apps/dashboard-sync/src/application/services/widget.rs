//! Live Widget
//!
//! Binds a refresh source to the event feed: on mount the widget registers
//! its topics, starts its refresh coordinator and forwards pushed events of
//! its kinds as refresh triggers. Unmounting (or dropping) the widget stops
//! polling, ends the forwarders and releases the topics.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;

use super::coordinator::{self, RefreshConfig, RefreshHandle};
use crate::application::ports::{RefreshSource, StatusProbe, WidgetStatus};
use crate::domain::events::{EventKind, Topic};
use crate::domain::refresh::WidgetState;
use crate::infrastructure::feed::{FeedClient, TopicSubscription};

// =============================================================================
// Widget Spec
// =============================================================================

/// What a widget watches and how often it polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSpec {
    /// Widget name used in logs, metrics and health output.
    pub name: String,
    /// Feed topics to register while mounted.
    pub topics: Vec<Topic>,
    /// Event kinds that trigger a refresh.
    pub event_kinds: Vec<EventKind>,
    /// Poll interval. `Duration::ZERO` disables polling.
    pub interval: Duration,
}

impl WidgetSpec {
    /// A widget that only polls.
    #[must_use]
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            topics: Vec::new(),
            event_kinds: Vec::new(),
            interval,
        }
    }

    /// Also register `topic`.
    #[must_use]
    pub fn with_topic(mut self, topic: Topic) -> Self {
        if !self.topics.contains(&topic) {
            self.topics.push(topic);
        }
        self
    }

    /// Refresh when an event of `kind` arrives on one of the topics.
    #[must_use]
    pub fn on_event(mut self, kind: EventKind) -> Self {
        if !self.event_kinds.contains(&kind) {
            self.event_kinds.push(kind);
        }
        self
    }

    /// Watch `kind` for one symbol: registers the symbol topic and refreshes
    /// on its events.
    #[must_use]
    pub fn for_symbol(self, kind: EventKind, symbol: &str) -> Self {
        self.with_topic(Topic::for_symbol(kind, symbol)).on_event(kind)
    }
}

// =============================================================================
// Live Widget
// =============================================================================

/// A mounted widget.
#[derive(Debug)]
pub struct LiveWidget<T> {
    refresh: RefreshHandle<T>,
    subscriptions: Vec<TopicSubscription>,
}

impl<T: Send + Sync + 'static> LiveWidget<T> {
    /// Mount a widget: register topics, start refreshing, forward events.
    ///
    /// Must be called inside a tokio runtime.
    pub fn mount<S>(feed: &FeedClient, spec: WidgetSpec, source: S) -> Self
    where
        S: RefreshSource<Snapshot = T>,
    {
        tracing::info!(
            widget = %spec.name,
            topics = spec.topics.len(),
            kinds = spec.event_kinds.len(),
            "Mounting widget"
        );

        let refresh = coordinator::activate(source, RefreshConfig::new(spec.name, spec.interval));

        let subscriptions: Vec<TopicSubscription> = spec
            .topics
            .iter()
            .cloned()
            .map(|topic| feed.subscribe_scoped(topic))
            .collect();

        for kind in spec.event_kinds {
            let events = feed.events(kind).until(refresh.cancellation_token());
            let mut events = if spec.topics.is_empty() {
                events
            } else {
                events.for_topics(spec.topics.iter().cloned())
            }
            .listen();

            let notifier = refresh.notifier();
            let widget = refresh.name().to_string();
            tokio::spawn(async move {
                while events.next().await.is_some() {
                    if !notifier.notify_event() {
                        break;
                    }
                }
                tracing::trace!(widget = %widget, kind = %kind, "Event forwarder stopped");
            });
        }

        Self {
            refresh,
            subscriptions,
        }
    }
}

impl<T> LiveWidget<T> {
    /// Widget name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.refresh.name()
    }

    /// Registered topics.
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.subscriptions.iter().map(TopicSubscription::topic)
    }

    /// Request a user-initiated refresh.
    pub fn refresh(&self) -> bool {
        self.refresh.refresh()
    }

    /// Current widget state.
    #[must_use]
    pub fn state(&self) -> WidgetState<T> {
        self.refresh.state()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<WidgetState<T>> {
        self.refresh.subscribe_state()
    }

    /// Last successfully fetched data.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<T>> {
        self.refresh.snapshot()
    }

    /// Errors from the most recent failed fetch.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.refresh.errors()
    }

    /// Clear displayed errors.
    pub fn dismiss_errors(&self) {
        self.refresh.dismiss_errors();
    }

    /// Underlying refresh handle.
    #[must_use]
    pub const fn handle(&self) -> &RefreshHandle<T> {
        &self.refresh
    }

    /// Unmount the widget.
    pub fn unmount(self) {
        tracing::info!(widget = %self.name(), "Unmounting widget");
        drop(self);
    }
}

impl<T: Send + Sync + 'static> LiveWidget<T> {
    /// Status probe for the health endpoint.
    #[must_use]
    pub fn probe(&self) -> Arc<dyn StatusProbe> {
        Arc::new(WidgetProbe {
            name: self.name().to_string(),
            state: self.subscribe_state(),
        })
    }
}

impl<T> Drop for LiveWidget<T> {
    fn drop(&mut self) {
        self.refresh.deactivate();
        self.subscriptions.clear();
    }
}

struct WidgetProbe<T> {
    name: String,
    state: watch::Receiver<WidgetState<T>>,
}

impl<T: Send + Sync> StatusProbe for WidgetProbe<T> {
    fn status(&self) -> WidgetStatus {
        WidgetStatus::from_state(&self.name, &self.state.borrow())
    }
}

// =============================================================================
// Tests
// =============================================================================
