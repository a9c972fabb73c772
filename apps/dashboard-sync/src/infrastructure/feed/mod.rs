//! Event Feed
//!
//! Websocket client for the dashboard's live event feed.
//!
//! # Protocol
//!
//! - Client → server: `{"action": "subscribe" | "unsubscribe", "topic": "..."}`
//! - Server → client: `{"event": "<kind>", "topic": "...", "data": ...}`, one
//!   object or an array of objects per text frame

mod client;
pub mod codec;
pub mod reconnect;
mod stream;

pub use client::{ConnectionState, FeedClient, FeedError, TopicSubscription};
pub use codec::{CodecError, JsonCodec};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use stream::EventStream;
