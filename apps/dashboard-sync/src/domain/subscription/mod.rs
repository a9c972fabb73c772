//! Topic Registry
//!
//! Reference-counted bookkeeping of which consumers (widgets) are interested
//! in which feed topics.
//!
//! # Design
//!
//! The registry tracks:
//! - Which topics each consumer is registered for
//! - A reference count per topic
//!
//! Many widgets can watch the same topic while the feed only sends one
//! upstream `subscribe` (on the first consumer) and one `unsubscribe`
//! (when the last consumer releases it).

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::events::Topic;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a consumer of feed topics (typically a widget).
pub type ConsumerId = u64;

/// Allocate a fresh random consumer id.
#[must_use]
pub fn new_consumer_id() -> ConsumerId {
    uuid::Uuid::new_v4().as_u64_pair().0
}

// =============================================================================
// Topic Changes
// =============================================================================

/// Upstream registrations required by a registry mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicChanges {
    /// Topics that went from zero to one consumer.
    pub subscribe: Vec<Topic>,
    /// Topics that lost their last consumer.
    pub unsubscribe: Vec<Topic>,
}

impl TopicChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    fn subscribe_only(topics: Vec<Topic>) -> Self {
        Self {
            subscribe: topics,
            unsubscribe: Vec::new(),
        }
    }

    fn unsubscribe_only(topics: Vec<Topic>) -> Self {
        Self {
            subscribe: Vec::new(),
            unsubscribe: topics,
        }
    }
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    consumer_topics: HashMap<ConsumerId, HashSet<Topic>>,
    topic_refcount: HashMap<Topic, usize>,
}

impl RegistryState {
    fn add(&mut self, consumer: ConsumerId, topics: &[Topic]) -> Vec<Topic> {
        let consumer_set = self.consumer_topics.entry(consumer).or_default();
        let mut first = Vec::new();

        for topic in topics {
            if !consumer_set.insert(topic.clone()) {
                continue;
            }

            let refcount = self.topic_refcount.entry(topic.clone()).or_insert(0);
            *refcount += 1;

            if *refcount == 1 {
                first.push(topic.clone());
            }
        }

        first
    }

    fn remove(&mut self, consumer: ConsumerId, topics: &[Topic]) -> Vec<Topic> {
        let Some(consumer_set) = self.consumer_topics.get_mut(&consumer) else {
            return vec![];
        };

        let mut released = Vec::new();
        for topic in topics {
            if consumer_set.remove(topic) && release(&mut self.topic_refcount, topic) {
                released.push(topic.clone());
            }
        }

        if consumer_set.is_empty() {
            self.consumer_topics.remove(&consumer);
        }

        released
    }

    fn remove_consumer(&mut self, consumer: ConsumerId) -> Vec<Topic> {
        let Some(consumer_set) = self.consumer_topics.remove(&consumer) else {
            return vec![];
        };

        let mut released: Vec<Topic> = consumer_set
            .into_iter()
            .filter(|topic| release(&mut self.topic_refcount, topic))
            .collect();
        released.sort();
        released
    }
}

/// Decrement a topic's refcount. Returns true when it reached zero.
fn release(refcounts: &mut HashMap<Topic, usize>, topic: &Topic) -> bool {
    let Some(refcount) = refcounts.get_mut(topic) else {
        return false;
    };

    *refcount = refcount.saturating_sub(1);
    if *refcount == 0 {
        refcounts.remove(topic);
        return true;
    }
    false
}

// =============================================================================
// Topic Registry
// =============================================================================

/// Thread-safe, reference-counted topic registry.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::domain::events::Topic;
/// use dashboard_sync::domain::subscription::TopicRegistry;
///
/// let registry = TopicRegistry::new();
/// let aapl = Topic::new("bbo_statistics:AAPL");
///
/// // First consumer: upstream subscribe needed
/// let changes = registry.add(1, &[aapl.clone()]);
/// assert_eq!(changes.subscribe, vec![aapl.clone()]);
///
/// // Second consumer shares the upstream subscription
/// assert!(registry.add(2, &[aapl.clone()]).is_empty());
///
/// // Still held by consumer 2
/// assert!(registry.remove(1, &[aapl.clone()]).is_empty());
///
/// // Last consumer gone: upstream unsubscribe needed
/// let changes = registry.remove(2, &[aapl.clone()]);
/// assert_eq!(changes.unsubscribe, vec![aapl]);
/// ```
#[derive(Debug, Default)]
pub struct TopicRegistry {
    state: RwLock<RegistryState>,
}

impl TopicRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer's interest in topics.
    ///
    /// Returns the topics that need an upstream subscribe.
    pub fn add(&self, consumer: ConsumerId, topics: &[Topic]) -> TopicChanges {
        TopicChanges::subscribe_only(self.state.write().add(consumer, topics))
    }

    /// Release a consumer's interest in topics.
    ///
    /// Returns the topics that need an upstream unsubscribe.
    pub fn remove(&self, consumer: ConsumerId, topics: &[Topic]) -> TopicChanges {
        TopicChanges::unsubscribe_only(self.state.write().remove(consumer, topics))
    }

    /// Release every topic held by a consumer.
    pub fn consumer_removed(&self, consumer: ConsumerId) -> TopicChanges {
        TopicChanges::unsubscribe_only(self.state.write().remove_consumer(consumer))
    }

    /// All topics with at least one consumer, sorted.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.state.read().topic_refcount.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Topics held by one consumer, sorted.
    #[must_use]
    pub fn consumer_topics(&self, consumer: ConsumerId) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .state
            .read()
            .consumer_topics
            .get(&consumer)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// Whether any consumer holds the topic.
    #[must_use]
    pub fn is_active(&self, topic: &Topic) -> bool {
        self.state.read().topic_refcount.contains_key(topic)
    }

    /// Current registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            topic_count: state.topic_refcount.len(),
            consumer_count: state.consumer_topics.len(),
        }
    }
}

/// Registry size snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of distinct active topics.
    pub topic_count: usize,
    /// Number of consumers holding at least one topic.
    pub consumer_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
