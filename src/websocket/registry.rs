//! Desired-subscription state, independent of any physical connection.
//!
//! The registry is the durable source of truth for what the caller wants to
//! be subscribed to. Sessions read a snapshot when (re)priming a fresh
//! socket; the caller mutates it through subscribe/unsubscribe. Pure
//! in-memory state, no I/O.

use std::sync::Arc;
use tokio::sync::Mutex;

/// One logical topic subscription.
///
/// The topic string is treated as an opaque key; topics spanning multiple
/// trading pairs via the `,` delimiter are a single subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: u64,
    pub topic: String,
    pub is_private: bool,
    /// Whether the server should return a receipt (`response: true`).
    pub wants_ack: bool,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
    next_id: u64,
}

/// Registry shared between the caller (mutating) and the session (replaying).
pub(crate) type SharedRegistry = Arc<Mutex<SubscriptionRegistry>>;

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Adds a subscription, or returns the existing entry when the same
    /// `(topic, is_private)` pair is already registered.
    pub fn add(&mut self, topic: impl Into<String>, is_private: bool, wants_ack: bool) -> Subscription {
        let topic = topic.into();
        if let Some(existing) = self
            .entries
            .iter()
            .find(|s| s.topic == topic && s.is_private == is_private)
        {
            return existing.clone();
        }
        let sub = Subscription {
            id: self.next_id,
            topic,
            is_private,
            wants_ack,
        };
        self.next_id += 1;
        self.entries.push(sub.clone());
        sub
    }

    /// Removes a subscription by id, returning it when present.
    pub fn remove(&mut self, id: u64) -> Option<Subscription> {
        let index = self.entries.iter().position(|s| s.id == id)?;
        Some(self.entries.remove(index))
    }

    /// All active subscriptions in insertion order, for deterministic replay.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
