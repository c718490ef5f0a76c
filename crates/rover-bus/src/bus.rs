// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic registry and fan-out.

use crate::publisher::Publisher;
use crate::queue::{Queue, QueueError};
use crate::subscriber::Subscriber;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A message delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Identity of the publisher.
    pub sender: String,
    /// Schema-agnostic payload.
    pub payload: Value,
}

/// Receiving end registered under topics: one queue per subscriber.
pub(crate) struct Inbox {
    pub(crate) key: u64,
    pub(crate) id: String,
    pub(crate) queue: Queue<BusMessage>,
}

#[derive(Default)]
struct Topic {
    subscribers: Vec<Arc<Inbox>>,
}

#[derive(Default)]
struct BusInner {
    topics: Mutex<HashMap<String, Topic>>,
    next_key: AtomicU64,
}

/// Publish/subscribe context shared by every task.
///
/// Cloning is cheap and every clone refers to the same registry. Topics are
/// created on first use and are never removed.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subscriber with an unbounded queue, registered on `topics`.
    pub fn subscriber<I, S>(&self, id: impl Into<String>, topics: I) -> Subscriber
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.subscriber_with_capacity(id, topics, 0)
    }

    /// Create a subscriber whose queue holds at most `capacity` messages.
    pub fn subscriber_with_capacity<I, S>(
        &self,
        id: impl Into<String>,
        topics: I,
        capacity: usize,
    ) -> Subscriber
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inbox = Arc::new(Inbox {
            key: self.inner.next_key.fetch_add(1, Ordering::Relaxed),
            id: id.into(),
            queue: Queue::new(capacity),
        });
        let sub = Subscriber::new(self.clone(), inbox);
        for topic in topics {
            sub.subscribe(topic.as_ref());
        }
        sub
    }

    /// Create a publisher with a fixed sender identity.
    pub fn publisher(&self, id: impl Into<String>) -> Publisher {
        Publisher::new(self.clone(), id.into())
    }

    /// Register `sub` under `topic`. Idempotent.
    pub fn subscribe(&self, sub: &Subscriber, topic: &str) -> bool {
        sub.subscribe(topic)
    }

    /// Remove `sub` from `topic`. Idempotent.
    pub fn unsubscribe(&self, sub: &Subscriber, topic: &str) -> bool {
        sub.unsubscribe(topic)
    }

    /// Remove `sub` from every topic.
    pub fn unsubscribe_all(&self, sub: &Subscriber) {
        sub.unsubscribe_all();
    }

    /// Deliver a message to every subscriber currently on `topic`.
    ///
    /// Subscribers are served in registration order. A subscriber whose queue
    /// is full misses this message; the publisher never suspends. Returns the
    /// number of queues that accepted the message.
    pub fn publish(&self, topic: &str, sender: &str, payload: Value) -> usize {
        let targets = {
            let mut topics = self.inner.topics.lock();
            topics
                .entry(topic.to_string())
                .or_default()
                .subscribers
                .clone()
        };

        if targets.is_empty() {
            trace!(topic, sender, "publish with no subscribers");
            return 0;
        }

        let mut delivered = 0;
        for inbox in &targets {
            let msg = BusMessage {
                topic: topic.to_string(),
                sender: sender.to_string(),
                payload: payload.clone(),
            };
            match inbox.queue.put_nowait(msg) {
                Ok(()) => delivered += 1,
                Err(QueueError::Full) => {
                    warn!(topic, subscriber = %inbox.id, "subscriber queue full, message dropped");
                }
                Err(e) => {
                    debug!(topic, subscriber = %inbox.id, error = %e, "delivery skipped");
                }
            }
        }

        trace!(topic, sender, delivered, "published");
        delivered
    }

    /// Names of every topic seen so far.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of subscribers currently registered on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map_or(0, |t| t.subscribers.len())
    }

    pub(crate) fn attach(&self, inbox: &Arc<Inbox>, topic: &str) -> bool {
        let mut topics = self.inner.topics.lock();
        let entry = topics.entry(topic.to_string()).or_default();
        if entry.subscribers.iter().any(|s| s.key == inbox.key) {
            return false;
        }
        entry.subscribers.push(inbox.clone());
        true
    }

    pub(crate) fn detach(&self, inbox: &Inbox, topic: &str) -> bool {
        let mut topics = self.inner.topics.lock();
        match topics.get_mut(topic) {
            Some(entry) => {
                let before = entry.subscribers.len();
                entry.subscribers.retain(|s| s.key != inbox.key);
                entry.subscribers.len() != before
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("topics", &self.topic_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_without_subscribers_creates_topic() {
        let bus = MessageBus::new();
        assert_eq!(bus.publish("motor", "test", json!({"speed": 1})), 0);
        assert_eq!(bus.topic_names(), vec!["motor".to_string()]);
        assert_eq!(bus.subscriber_count("motor"), 0);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let bus = MessageBus::new();
        let sub = bus.subscriber("servo", ["servo"]);
        assert!(!bus.subscribe(&sub, "servo"));
        assert_eq!(bus.subscriber_count("servo"), 1);

        bus.publish("servo", "test", json!(1));
        assert_eq!(sub.len(), 1);
    }

    #[test]
    fn test_same_identity_distinct_subscribers() {
        let bus = MessageBus::new();
        let a = bus.subscriber("handler", ["reply"]);
        let b = bus.subscriber("handler", ["reply"]);
        assert_eq!(bus.subscriber_count("reply"), 2);

        a.close();
        assert_eq!(bus.subscriber_count("reply"), 1);
        assert_eq!(bus.publish("reply", "test", Value::Null), 1);
        assert!(b.get_nowait().is_some());
    }

    #[test]
    fn test_full_subscriber_does_not_block_others() {
        let bus = MessageBus::new();
        let slow = bus.subscriber_with_capacity("slow", ["t"], 1);
        let fast = bus.subscriber("fast", ["t"]);

        assert_eq!(bus.publish("t", "p", json!(1)), 2);
        assert_eq!(bus.publish("t", "p", json!(2)), 1);

        assert_eq!(slow.len(), 1);
        assert_eq!(fast.len(), 2);
    }

    #[test]
    fn test_unsubscribe_unknown_topic() {
        let bus = MessageBus::new();
        let sub = bus.subscriber("x", Vec::<String>::new());
        assert!(!bus.unsubscribe(&sub, "never"));
    }
}
