//! Feed Client
//!
//! One shared websocket connection to the dashboard event feed.
//!
//! # Lifecycle
//!
//! `connect()` spawns a background task that connects, re-registers every
//! active topic, and dispatches pushed events to a broadcast channel. On
//! transport errors it reconnects with exponential backoff; when attempts
//! are exhausted the state becomes `Failed` and `connect()` may be called
//! again.
//!
//! # Registration
//!
//! Topic registrations are reference-counted per consumer. They can be made
//! at any time: while disconnected they are queued, and every (re)connect
//! sends the full active topic set.

use std::fmt;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use super::stream::EventStream;
use crate::domain::events::{ClientMessage, EventKind, LiveEvent, Topic};
use crate::domain::subscription::{
    ConsumerId, RegistryStats, TopicChanges, TopicRegistry, new_consumer_id,
};
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur on the feed connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Connection State
// =============================================================================

/// Observable state of the feed connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// `connect()` has not been called.
    #[default]
    Idle,
    /// First connection attempt in progress.
    Connecting,
    /// Connected; events are flowing.
    Connected,
    /// Waiting before a reconnection attempt.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Not connected (transport error or shutdown).
    Disconnected,
    /// Gave up reconnecting.
    Failed {
        /// Last connection error.
        reason: String,
    },
}

impl ConnectionState {
    /// Whether the connection is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short label for logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// Feed Client
// =============================================================================

struct FeedShared {
    settings: FeedSettings,
    codec: JsonCodec,
    registry: TopicRegistry,
    /// Serializes registry mutation with command emission.
    registration: Mutex<()>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<Arc<LiveEvent>>,
    commands: mpsc::UnboundedSender<ClientMessage>,
    /// Present while no connection task owns it.
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientMessage>>>,
    cancel: CancellationToken,
}

/// Shared websocket client for the event feed.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct FeedClient {
    shared: Arc<FeedShared>,
}

impl fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("url", &self.shared.settings.url)
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Create a client. No connection is made until [`connect`](Self::connect).
    #[must_use]
    pub fn new(settings: FeedSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (commands, command_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(FeedShared {
                settings,
                codec: JsonCodec::new(),
                registry: TopicRegistry::new(),
                registration: Mutex::new(()),
                state,
                events,
                commands,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Start the connection task.
    ///
    /// Returns `false` if a task is already running or the client was shut
    /// down. Must be called inside a tokio runtime.
    pub fn connect(&self) -> bool {
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        let Some(commands) = self.shared.command_rx.lock().take() else {
            return false;
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let (commands, final_state) = shared.run(commands).await;
            // Publish before handing the receiver back so a new task's state wins.
            let mut slot = shared.command_rx.lock();
            shared.set_state(final_state);
            *slot = Some(commands);
        });
        true
    }

    /// Stop the connection task. The client cannot be reconnected afterwards.
    pub fn shutdown(&self) {
        if !self.shared.cancel.is_cancelled() {
            tracing::info!("Shutting down feed client");
            self.shared.cancel.cancel();
        }
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register a consumer's interest in a topic.
    pub fn subscribe(&self, consumer: ConsumerId, topic: &Topic) {
        self.register(|registry| registry.add(consumer, std::slice::from_ref(topic)));
    }

    /// Release a consumer's interest in a topic.
    pub fn unsubscribe(&self, consumer: ConsumerId, topic: &Topic) {
        self.register(|registry| registry.remove(consumer, std::slice::from_ref(topic)));
    }

    /// Release every topic held by a consumer.
    pub fn release_consumer(&self, consumer: ConsumerId) {
        self.register(|registry| registry.consumer_removed(consumer));
    }

    /// Register a topic under a fresh consumer, released when the handle
    /// is dropped.
    #[must_use]
    pub fn subscribe_scoped(&self, topic: Topic) -> TopicSubscription {
        let consumer = new_consumer_id();
        self.subscribe(consumer, &topic);
        TopicSubscription {
            client: self.clone(),
            consumer,
            topic,
            token: self.shared.cancel.child_token(),
        }
    }

    fn register(&self, mutate: impl FnOnce(&TopicRegistry) -> TopicChanges) {
        let _guard = self.shared.registration.lock();
        let changes = mutate(&self.shared.registry);

        for topic in changes.subscribe {
            tracing::debug!(topic = %topic, "Subscribing to topic");
            self.shared.queue(ClientMessage::subscribe(topic));
        }
        for topic in changes.unsubscribe {
            tracing::debug!(topic = %topic, "Unsubscribing from topic");
            self.shared.queue(ClientMessage::unsubscribe(topic));
        }
        metrics::set_active_topics(self.shared.registry.stats().topic_count);
    }

    /// Topics with at least one consumer.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        self.shared.registry.active_topics()
    }

    /// Registry statistics.
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        self.shared.registry.stats()
    }

    /// Feed a raw frame through the decoder as if it came off the socket.
    #[cfg(test)]
    pub(crate) fn dispatch_frame(&self, text: &str) {
        self.shared.dispatch(text);
    }

    // -------------------------------------------------------------------------
    // Event streams
    // -------------------------------------------------------------------------

    /// Typed payload stream for one event kind.
    #[must_use]
    pub fn on<T>(&self, kind: EventKind) -> EventStream<T>
    where
        T: DeserializeOwned,
    {
        EventStream::new(self.shared.events.clone(), kind, |event| event.decode())
    }

    /// Raw event stream for one event kind.
    #[must_use]
    pub fn events(&self, kind: EventKind) -> EventStream<Arc<LiveEvent>> {
        EventStream::new(self.shared.events.clone(), kind, |event| Ok(Arc::clone(event)))
    }

    // -------------------------------------------------------------------------
    // Connection state
    // -------------------------------------------------------------------------

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// Whether the connection is open right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.state.borrow().is_open()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Stream of "connection open" flags, starting with the current value
    /// and yielding only on change.
    pub fn connection_open(&self) -> impl Stream<Item = bool> + Send + 'static {
        let mut last = None;
        tokio_stream::StreamExt::filter_map(
            WatchStream::new(self.shared.state.subscribe()),
            move |state| {
                let open = state.is_open();
                if last == Some(open) {
                    return None;
                }
                last = Some(open);
                Some(open)
            },
        )
    }
}

// =============================================================================
// Connection Task
// =============================================================================

impl FeedShared {
    fn queue(&self, message: ClientMessage) {
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.commands.send(message);
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            tracing::info!(state = %next, "Feed connection state changed");
            metrics::set_feed_connected(next.is_open());
        }
    }

    /// Connect and reconnect until cancelled or out of attempts.
    ///
    /// Hands the command receiver back together with the state to publish.
    async fn run(
        &self,
        mut commands: mpsc::UnboundedReceiver<ClientMessage>,
    ) -> (mpsc::UnboundedReceiver<ClientMessage>, ConnectionState) {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::from_feed_settings(&self.settings));
        self.set_state(ConnectionState::Connecting);

        loop {
            if self.cancel.is_cancelled() {
                return (commands, ConnectionState::Disconnected);
            }

            match self.connect_and_run(&mut commands, &mut policy).await {
                Ok(()) => {
                    tracing::info!("Feed client cancelled");
                    return (commands, ConnectionState::Disconnected);
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %self.settings.url, "Feed connection error");
                    self.set_state(ConnectionState::Disconnected);

                    let Some(delay) = policy.next_delay() else {
                        let attempts = policy.attempt_count();
                        tracing::error!(attempts, error = %e, "Giving up on feed connection");
                        return (
                            commands,
                            ConnectionState::Failed {
                                reason: format!(
                                    "{}: {e}",
                                    ReconnectError::MaxAttemptsExceeded(attempts)
                                ),
                            },
                        );
                    };

                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to event feed"
                    );
                    metrics::record_reconnect();
                    self.set_state(ConnectionState::Reconnecting { attempt });

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            return (commands, ConnectionState::Disconnected);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect once and pump messages until error or cancellation.
    async fn connect_and_run(
        &self,
        commands: &mut mpsc::UnboundedReceiver<ClientMessage>,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedError> {
        tracing::info!(url = %self.settings.url, "Connecting to event feed");

        let ws_stream = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.settings.url.as_str()) => result?.0,
        };
        let (mut write, mut read) = ws_stream.split();

        policy.reset();

        // Anything queued while offline is covered by the full re-send below;
        // commands queued after the snapshot are deltas on top of it.
        let topics = {
            let _guard = self.registration.lock();
            while commands.try_recv().is_ok() {}
            self.registry.active_topics()
        };
        self.set_state(ConnectionState::Connected);

        for topic in topics {
            self.send(&mut write, &ClientMessage::subscribe(topic)).await?;
        }

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(command) = commands.recv() => {
                    self.send(&mut write, &command).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(FeedError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("Feed stream ended");
                            return Err(FeedError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    async fn send<W>(&self, write: &mut W, message: &ClientMessage) -> Result<(), FeedError>
    where
        W: Sink<Message> + Unpin,
        W::Error: fmt::Display,
    {
        let json = self.codec.encode(message)?;
        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| FeedError::Send(e.to_string()))
    }

    fn dispatch(&self, text: &str) {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable feed frame");
                metrics::record_decode_error();
                return;
            }
        };

        for message in messages {
            match message {
                Ok(message) => {
                    metrics::record_event_received(message.event);
                    // No receivers simply means nobody is listening yet.
                    let _ = self.events.send(Arc::new(LiveEvent::from(message)));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed feed event");
                    metrics::record_decode_error();
                }
            }
        }
    }
}

// =============================================================================
// Topic Subscription
// =============================================================================

/// Handle for one registered topic.
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) releases the
/// topic and ends every stream derived from it.
pub struct TopicSubscription {
    client: FeedClient,
    consumer: ConsumerId,
    topic: Topic,
    token: CancellationToken,
}

impl TopicSubscription {
    /// The registered topic.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Consumer id owning the registration.
    #[must_use]
    pub const fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// Typed events of `kind` on this topic, ending on release.
    #[must_use]
    pub fn on<T: DeserializeOwned>(&self, kind: EventKind) -> EventStream<T> {
        self.client
            .on(kind)
            .for_topic(self.topic.clone())
            .until(self.token.clone())
    }

    /// Raw events of `kind` on this topic, ending on release.
    #[must_use]
    pub fn events(&self, kind: EventKind) -> EventStream<Arc<LiveEvent>> {
        self.client
            .events(kind)
            .for_topic(self.topic.clone())
            .until(self.token.clone())
    }

    /// Release the topic now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSubscription")
            .field("consumer", &self.consumer)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl Drop for TopicSubscription {
    fn drop(&mut self) {
        self.token.cancel();
        self.client.unsubscribe(self.consumer, &self.topic);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FeedClient {
        FeedClient::new(FeedSettings::new("ws://127.0.0.1:9/ws"))
    }

    fn drain(client: &FeedClient) -> Vec<ClientMessage> {
        let mut guard = client.shared.command_rx.lock();
        let rx = guard.as_mut().unwrap();
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn registrations_are_queued_while_idle() {
        let client = client();
        let topic = Topic::new("bbo_statistics:AAPL");

        client.subscribe(1, &topic);
        client.subscribe(2, &topic);

        assert_eq!(drain(&client), vec![ClientMessage::subscribe(topic.clone())]);
        assert_eq!(client.state(), ConnectionState::Idle);
        assert_eq!(client.active_topics(), vec![topic]);
    }

    #[test]
    fn last_release_queues_unsubscribe() {
        let client = client();
        let topic = Topic::new("order_status");
        client.subscribe(1, &topic);
        client.subscribe(2, &topic);
        drain(&client);

        client.unsubscribe(1, &topic);
        assert!(drain(&client).is_empty());

        client.release_consumer(2);
        assert_eq!(drain(&client), vec![ClientMessage::unsubscribe(topic)]);
        assert!(client.active_topics().is_empty());
    }

    #[test]
    fn scoped_subscription_releases_on_drop() {
        let client = client();
        let subscription = client.subscribe_scoped(Topic::new("dashboard_top5"));
        assert_eq!(client.registry_stats().topic_count, 1);

        let stream = subscription.events(EventKind::DashboardTop5);
        subscription.unsubscribe();

        assert_eq!(client.registry_stats(), RegistryStats::default());
        assert_eq!(
            drain(&client),
            vec![
                ClientMessage::subscribe(Topic::new("dashboard_top5")),
                ClientMessage::unsubscribe(Topic::new("dashboard_top5")),
            ]
        );
        drop(stream);
    }

    #[test]
    fn dispatch_publishes_decoded_events() {
        let client = client();
        let mut rx = client.shared.events.subscribe();

        client.shared.dispatch(
            r#"[{"event":"order_status","data":{"id":1}},{"event":"bogus"},{"event":"chart_series","data":[]}]"#,
        );

        assert_eq!(rx.try_recv().unwrap().kind, EventKind::OrderStatus);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::ChartSeries);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn connection_state_labels() {
        assert!(ConnectionState::Connected.is_open());
        assert!(!ConnectionState::Reconnecting { attempt: 1 }.is_open());
        assert_eq!(
            ConnectionState::Failed {
                reason: "refused".into()
            }
            .to_string(),
            "failed: refused"
        );
        assert_eq!(ConnectionState::Idle.to_string(), "idle");
    }

    #[tokio::test]
    async fn connect_is_idempotent_and_refused_after_shutdown() {
        let client = client();

        assert!(client.connect());
        assert!(!client.connect());

        client.shutdown();
        let mut states = client.state_changes();
        states
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert!(!client.connect());
    }
}
