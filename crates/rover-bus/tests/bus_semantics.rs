// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery semantics across publishers, subscribers and tasks.

use rover_bus::{MessageBus, QueueError};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_late_subscriber_misses_earlier_message() {
    let bus = MessageBus::new();
    let publisher = bus.publisher("sensor");

    assert_eq!(publisher.publish("scan", json!({"seq": 1})), 0);
    let late = bus.subscriber("late", ["scan"]);
    assert_eq!(publisher.publish("scan", json!({"seq": 2})), 1);

    let msg = late.get_nowait().expect("second message");
    assert_eq!(msg.payload, json!({"seq": 2}));
    assert!(late.get_nowait().is_none());
}

#[test]
fn test_every_subscriber_sees_every_message_in_order() {
    let bus = MessageBus::new();
    let a = bus.subscriber("a", ["drive"]);
    let b = bus.subscriber("b", ["drive"]);
    let publisher = bus.publisher("app");

    for i in 0..10 {
        assert_eq!(publisher.publish("drive", json!(i)), 2);
    }

    let seq_a: Vec<_> = std::iter::from_fn(|| a.get_nowait()).map(|m| m.payload).collect();
    let seq_b: Vec<_> = std::iter::from_fn(|| b.get_nowait()).map(|m| m.payload).collect();
    let expected: Vec<_> = (0..10).map(|i| json!(i)).collect();
    assert_eq!(seq_a, expected);
    assert_eq!(seq_b, expected);
}

#[test]
fn test_subscriber_on_two_topics_gets_both() {
    let bus = MessageBus::new();
    let sub = bus.subscriber("multi", ["left", "right"]);
    bus.publish("left", "x", json!("l"));
    bus.publish("right", "x", json!("r"));

    let first = sub.get_nowait().expect("left");
    let second = sub.get_nowait().expect("right");
    assert_eq!((first.topic.as_str(), second.topic.as_str()), ("left", "right"));
}

#[test]
fn test_event_carries_null_payload() {
    let bus = MessageBus::new();
    let sub = bus.subscriber("main", ["quit"]);
    bus.publisher("app").event("quit");

    let msg = sub.get_nowait().expect("quit event");
    assert!(msg.payload.is_null());
    assert_eq!(msg.sender, "app");
}

#[tokio::test]
async fn test_responder_task_round_trip() {
    let bus = MessageBus::new();
    let commands = bus.subscriber("echo", ["echo"]);
    let replies = bus.subscriber("caller", ["echo_report"]);

    let responder = {
        let publisher = bus.publisher("echo");
        tokio::spawn(async move {
            let msg = commands.get().await.expect("command");
            publisher.publish("echo_report", msg.payload);
        })
    };

    bus.publish("echo", "caller", json!({"ping": true}));
    let reply = replies
        .get_timeout(Duration::from_secs(1))
        .await
        .expect("reply");
    assert_eq!(reply.sender, "echo");
    assert_eq!(reply.payload, json!({"ping": true}));
    responder.await.expect("responder");
}

#[tokio::test(start_paused = true)]
async fn test_wait_without_responder_times_out() {
    let bus = MessageBus::new();
    let sub = bus.subscriber("caller", ["nobody_home"]);
    let res = sub.get_timeout(Duration::from_secs(1)).await;
    assert_eq!(res.map(|m| m.topic), Err(QueueError::Timeout));
}
