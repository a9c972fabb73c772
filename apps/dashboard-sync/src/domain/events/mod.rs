//! Live Event Types
//!
//! The event feed pushes `{event, topic?, data}` messages; clients register
//! interest with `{action, topic}` messages. Event kinds are a fixed set.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Kind
// =============================================================================

/// Kinds of events pushed by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Best bid/offer statistics for a symbol.
    BboStatistics,
    /// Last-sale statistics for a symbol.
    LastSaleStatistics,
    /// Price/volume chart series points.
    ChartSeries,
    /// Dashboard top-5 lists (most active, gainers, decliners).
    DashboardTop5,
    /// Order status changes.
    OrderStatus,
}

impl EventKind {
    /// All event kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::BboStatistics,
            Self::LastSaleStatistics,
            Self::ChartSeries,
            Self::DashboardTop5,
            Self::OrderStatus,
        ]
    }

    /// Wire name of the event kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BboStatistics => "bbo_statistics",
            Self::LastSaleStatistics => "last_sale_statistics",
            Self::ChartSeries => "chart_series",
            Self::DashboardTop5 => "dashboard_top5",
            Self::OrderStatus => "order_status",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Topic
// =============================================================================

/// A named channel on the event feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a topic from a raw name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Topic for one event kind of one symbol, e.g. `bbo_statistics:AAPL`.
    #[must_use]
    pub fn for_symbol(kind: EventKind, symbol: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), symbol.trim().to_uppercase()))
    }

    /// Topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// =============================================================================
// Wire Messages
// =============================================================================

/// Registration action sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    /// Start receiving a topic.
    Subscribe,
    /// Stop receiving a topic.
    Unsubscribe,
}

/// Client → server registration message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Subscribe or unsubscribe.
    pub action: SubscriptionAction,
    /// Topic to (un)register.
    pub topic: Topic,
}

impl ClientMessage {
    /// Subscribe message.
    #[must_use]
    pub const fn subscribe(topic: Topic) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            topic,
        }
    }

    /// Unsubscribe message.
    #[must_use]
    pub const fn unsubscribe(topic: Topic) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            topic,
        }
    }
}

/// Server → client push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Event kind.
    pub event: EventKind,
    /// Topic the event was published on, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

// =============================================================================
// Live Event
// =============================================================================

/// A pushed update as delivered to event streams.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    /// Topic, if the server included one.
    pub topic: Option<Topic>,
    /// Event kind.
    pub kind: EventKind,
    /// Raw payload.
    pub data: serde_json::Value,
}

impl LiveEvent {
    /// Deserialize the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the payload does not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }

    /// Whether the event was published on the given topic.
    ///
    /// Events without a topic are broadcast to every listener of their kind.
    #[must_use]
    pub fn is_for(&self, topic: &Topic) -> bool {
        self.topic.as_ref().is_none_or(|t| t == topic)
    }
}

impl From<ServerMessage> for LiveEvent {
    fn from(message: ServerMessage) -> Self {
        Self {
            topic: message.topic,
            kind: message.event,
            data: message.data,
        }
    }
}

// =============================================================================
// Typed Payloads
// =============================================================================

/// Best bid/offer statistics payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BboStatistics {
    /// Symbol.
    pub symbol: String,
    /// Best bid price.
    #[serde(default)]
    pub bid_price: Option<Decimal>,
    /// Size at the best bid.
    #[serde(default)]
    pub bid_quantity: Option<Decimal>,
    /// Best offer price.
    #[serde(default)]
    pub offer_price: Option<Decimal>,
    /// Size at the best offer.
    #[serde(default)]
    pub offer_quantity: Option<Decimal>,
}

/// Last-sale statistics payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSaleStatistics {
    /// Symbol.
    pub symbol: String,
    /// Last traded price.
    #[serde(default)]
    pub last_price: Option<Decimal>,
    /// Cumulative traded volume.
    #[serde(default)]
    pub volume: Option<Decimal>,
    /// Number of trades.
    #[serde(default)]
    pub trade_count: Option<u64>,
}

// =============================================================================
// Tests
// =============================================================================
