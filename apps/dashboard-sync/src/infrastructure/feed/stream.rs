//! Event Streams
//!
//! Per-kind views over the feed's broadcast channel. A stream registers its
//! receiver on first poll, so building one costs nothing until it is used,
//! and cloning yields an independent stream that starts from "now".

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::domain::events::{EventKind, LiveEvent, Topic};
use crate::infrastructure::metrics;

type Decode<T> = fn(&Arc<LiveEvent>) -> Result<T, serde_json::Error>;

/// Lazy, restartable stream of one event kind.
///
/// Payloads that fail to decode are logged and skipped. A receiver that
/// falls behind the channel capacity skips the lost events with a warning.
pub struct EventStream<T> {
    sender: broadcast::Sender<Arc<LiveEvent>>,
    kind: EventKind,
    topics: Option<Arc<[Topic]>>,
    until: Option<CancellationToken>,
    decode: Decode<T>,
    receiver: Option<Pin<Box<BroadcastStream<Arc<LiveEvent>>>>>,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    done: bool,
}

impl<T> EventStream<T> {
    pub(crate) const fn new(
        sender: broadcast::Sender<Arc<LiveEvent>>,
        kind: EventKind,
        decode: Decode<T>,
    ) -> Self {
        Self {
            sender,
            kind,
            topics: None,
            until: None,
            decode,
            receiver: None,
            cancelled: None,
            done: false,
        }
    }

    /// Only yield events published on `topic` (or without a topic).
    #[must_use]
    pub fn for_topic(self, topic: Topic) -> Self {
        self.for_topics([topic])
    }

    /// Only yield events published on one of `topics` (or without a topic).
    #[must_use]
    pub fn for_topics(mut self, topics: impl IntoIterator<Item = Topic>) -> Self {
        self.topics = Some(topics.into_iter().collect());
        self
    }

    /// End the stream once `token` is cancelled.
    #[must_use]
    pub fn until(mut self, token: CancellationToken) -> Self {
        self.until = Some(token);
        self
    }

    /// Register the receiver now instead of on first poll.
    ///
    /// Events published from here on are buffered for the stream.
    #[must_use]
    pub fn listen(mut self) -> Self {
        if self.receiver.is_none() {
            self.receiver = Some(Box::pin(BroadcastStream::new(self.sender.subscribe())));
        }
        self
    }

    /// Event kind carried by this stream.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            kind: self.kind,
            topics: self.topics.clone(),
            until: self.until.clone(),
            decode: self.decode,
            receiver: None,
            cancelled: None,
            done: false,
        }
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("kind", &self.kind)
            .field("topics", &self.topics)
            .field("started", &self.receiver.is_some())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        if let Some(token) = &this.until {
            let cancelled = this
                .cancelled
                .get_or_insert_with(|| Box::pin(token.clone().cancelled_owned()));
            if cancelled.as_mut().poll(cx).is_ready() {
                this.done = true;
                return Poll::Ready(None);
            }
        }

        let receiver = this
            .receiver
            .get_or_insert_with(|| Box::pin(BroadcastStream::new(this.sender.subscribe())));

        loop {
            match receiver.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if !Self::accepts_parts(this.kind, this.topics.as_deref(), &event) {
                        continue;
                    }
                    match (this.decode)(&event) {
                        Ok(value) => return Poll::Ready(Some(value)),
                        Err(e) => {
                            tracing::warn!(kind = %this.kind, error = %e, "Skipping undecodable event");
                            metrics::record_decode_error();
                        }
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(kind = %this.kind, skipped, "Event stream lagged");
                    metrics::record_events_lagged(this.kind, skipped);
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> EventStream<T> {
    fn accepts_parts(kind: EventKind, topics: Option<&[Topic]>, event: &LiveEvent) -> bool {
        event.kind == kind
            && topics.is_none_or(|topics| topics.iter().any(|topic| event.is_for(topic)))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;

    use super::*;

    fn event(kind: EventKind, topic: Option<&str>, data: serde_json::Value) -> Arc<LiveEvent> {
        Arc::new(LiveEvent {
            topic: topic.map(Topic::new),
            kind,
            data,
        })
    }

    fn raw(sender: &broadcast::Sender<Arc<LiveEvent>>, kind: EventKind) -> EventStream<Arc<LiveEvent>> {
        EventStream::new(sender.clone(), kind, |e| Ok(Arc::clone(e)))
    }

    #[tokio::test]
    async fn filters_by_kind_and_topic() {
        let (tx, _) = broadcast::channel(16);
        let mut stream = raw(&tx, EventKind::BboStatistics).for_topic(Topic::new("bbo:AAPL"));

        // Register the receiver before publishing.
        assert!(futures_util::poll!(stream.next()).is_pending());

        tx.send(event(EventKind::LastSaleStatistics, Some("bbo:AAPL"), json!(1))).unwrap();
        tx.send(event(EventKind::BboStatistics, Some("bbo:MSFT"), json!(2))).unwrap();
        tx.send(event(EventKind::BboStatistics, Some("bbo:AAPL"), json!(3))).unwrap();
        tx.send(event(EventKind::BboStatistics, None, json!(4))).unwrap();

        assert_eq!(stream.next().await.unwrap().data, json!(3));
        assert_eq!(stream.next().await.unwrap().data, json!(4));
    }

    #[tokio::test]
    async fn is_lazy_until_polled() {
        let (tx, _) = broadcast::channel(16);
        let stream = raw(&tx, EventKind::OrderStatus);

        assert_eq!(tx.receiver_count(), 0);
        drop(stream);
        assert_eq!(tx.receiver_count(), 0);
    }

    #[tokio::test]
    async fn listen_buffers_events_published_before_first_poll() {
        let (tx, _) = broadcast::channel(16);
        let mut stream = raw(&tx, EventKind::OrderStatus).listen();
        assert_eq!(tx.receiver_count(), 1);

        tx.send(event(EventKind::OrderStatus, None, json!(1))).unwrap();

        assert_eq!(stream.next().await.unwrap().data, json!(1));
    }

    #[tokio::test]
    async fn clone_is_a_fresh_stream() {
        let (tx, _) = broadcast::channel(16);
        let mut first = raw(&tx, EventKind::OrderStatus);
        assert!(futures_util::poll!(first.next()).is_pending());

        let second = first.clone();
        assert_eq!(tx.receiver_count(), 1);
        drop(second);
    }

    #[tokio::test]
    async fn skips_undecodable_payloads() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Order {
            id: u64,
        }

        let (tx, _) = broadcast::channel(16);
        let mut stream: EventStream<Order> =
            EventStream::new(tx.clone(), EventKind::OrderStatus, |e| e.decode());
        assert!(futures_util::poll!(stream.next()).is_pending());

        tx.send(event(EventKind::OrderStatus, None, json!({"id": "nope"}))).unwrap();
        tx.send(event(EventKind::OrderStatus, None, json!({"id": 7}))).unwrap();

        assert_eq!(stream.next().await, Some(Order { id: 7 }));
    }

    #[tokio::test]
    async fn ends_when_token_cancelled() {
        let (tx, _) = broadcast::channel(16);
        let token = CancellationToken::new();
        let mut stream = raw(&tx, EventKind::OrderStatus).until(token.clone());

        assert!(futures_util::poll!(stream.next()).is_pending());
        token.cancel();

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn lagging_receiver_skips_lost_events() {
        let (tx, _) = broadcast::channel(2);
        let mut stream = raw(&tx, EventKind::OrderStatus);
        assert!(futures_util::poll!(stream.next()).is_pending());

        for i in 0..5 {
            tx.send(event(EventKind::OrderStatus, None, json!(i))).unwrap();
        }

        assert_eq!(stream.next().await.unwrap().data, json!(3));
        assert_eq!(stream.next().await.unwrap().data, json!(4));
    }
}
