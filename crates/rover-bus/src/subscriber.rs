// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiving side of the bus.

use crate::bus::{BusMessage, Inbox, MessageBus};
use crate::queue::QueueError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A named queue registered under a set of topics.
///
/// Messages arrive in publish order. [`Subscriber::close`] removes the
/// subscriber from every topic; callers release temporary subscribers
/// explicitly once they are done waiting. Dropping an open subscriber closes
/// it as well.
pub struct Subscriber {
    bus: MessageBus,
    inbox: Arc<Inbox>,
    topics: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl Subscriber {
    pub(crate) fn new(bus: MessageBus, inbox: Arc<Inbox>) -> Self {
        Self {
            bus,
            inbox,
            topics: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Identity string given at creation.
    pub fn id(&self) -> &str {
        &self.inbox.id
    }

    /// Topics this subscriber is registered on, in subscription order.
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.inbox.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inbox.queue.is_empty()
    }

    /// Register on `topic`. Returns false if already registered or closed.
    pub fn subscribe(&self, topic: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        if !self.bus.attach(&self.inbox, topic) {
            return false;
        }
        self.topics.lock().push(topic.to_string());
        trace!(subscriber = %self.inbox.id, topic, "subscribed");
        true
    }

    /// Leave `topic`. Returns false if not registered.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.topics.lock().retain(|t| t != topic);
        self.bus.detach(&self.inbox, topic)
    }

    /// Leave every topic.
    pub fn unsubscribe_all(&self) {
        let topics = std::mem::take(&mut *self.topics.lock());
        for topic in &topics {
            self.bus.detach(&self.inbox, topic);
        }
    }

    /// Unsubscribe from everything and close the queue. Idempotent.
    ///
    /// Messages already queued remain readable.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.unsubscribe_all();
        self.inbox.queue.close();
        trace!(subscriber = %self.inbox.id, "closed");
    }

    /// Wait for the next message.
    pub async fn get(&self) -> Result<BusMessage, QueueError> {
        self.inbox.queue.get().await
    }

    /// Wait for the next message, at most `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<BusMessage, QueueError> {
        self.inbox.queue.get_timeout(timeout).await
    }

    /// Next message if one is already queued.
    pub fn get_nowait(&self) -> Option<BusMessage> {
        self.inbox.queue.get_nowait().ok()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.inbox.id)
            .field("topics", &self.topics())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_close_is_idempotent() {
        let bus = MessageBus::new();
        let sub = bus.subscriber("t", ["a", "b"]);
        assert_eq!(sub.topics(), vec!["a".to_string(), "b".to_string()]);

        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert!(sub.topics().is_empty());
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.subscriber_count("b"), 0);
    }

    #[test]
    fn test_closed_subscriber_cannot_resubscribe() {
        let bus = MessageBus::new();
        let sub = bus.subscriber("t", ["a"]);
        sub.close();
        assert!(!sub.subscribe("a"));
        assert_eq!(bus.subscriber_count("a"), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = MessageBus::new();
        {
            let _sub = bus.subscriber("scoped", ["reply"]);
            assert_eq!(bus.subscriber_count("reply"), 1);
        }
        assert_eq!(bus.subscriber_count("reply"), 0);
    }

    #[tokio::test]
    async fn test_queued_messages_survive_close() {
        let bus = MessageBus::new();
        let sub = bus.subscriber("t", ["a"]);
        bus.publish("a", "p", json!("last"));
        sub.close();

        let msg = sub.get().await.unwrap();
        assert_eq!(msg.payload, json!("last"));
        assert_eq!(sub.get().await, Err(QueueError::Closed));
    }

    #[test]
    fn test_unsubscribe_single_topic() {
        let bus = MessageBus::new();
        let sub = bus.subscriber("t", ["a", "b"]);
        assert!(sub.unsubscribe("a"));
        assert!(!sub.unsubscribe("a"));
        assert_eq!(sub.topics(), vec!["b".to_string()]);

        bus.publish("a", "p", json!(1));
        bus.publish("b", "p", json!(2));
        assert_eq!(sub.get_nowait().map(|m| m.payload), Some(json!(2)));
        assert!(sub.get_nowait().is_none());
    }
}
