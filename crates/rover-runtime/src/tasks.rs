// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in bus tasks.
//!
//! Each task owns a command topic named after itself and publishes results on
//! `<name>_report`.

use rover_bus::{MessageBus, QueueError};
use tracing::{debug, info};

pub const ECHO_TOPIC: &str = "echo";
pub const ECHO_REPORT_TOPIC: &str = "echo_report";

/// Report topic for a task command topic.
pub fn report_topic(task: &str) -> String {
    format!("{task}_report")
}

/// Republish every `echo` payload on `echo_report`.
///
/// Returns when the subscription is closed.
pub async fn echo_task(bus: MessageBus) -> Result<(), QueueError> {
    let inbox = bus.subscriber(ECHO_TOPIC, [ECHO_TOPIC]);
    let reports = bus.publisher(ECHO_TOPIC);
    let report = report_topic(ECHO_TOPIC);
    info!(%report, "echo task started");

    loop {
        let msg = inbox.get().await?;
        debug!(sender = %msg.sender, "echo");
        reports.publish(&report, msg.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_report_topic() {
        assert_eq!(report_topic("servo"), "servo_report");
        assert_eq!(report_topic(ECHO_TOPIC), ECHO_REPORT_TOPIC);
    }

    #[tokio::test]
    async fn test_echo_republishes() {
        let bus = MessageBus::new();
        let reports = bus.subscriber("test", [ECHO_REPORT_TOPIC]);
        let task = tokio::spawn(echo_task(bus.clone()));

        // wait for the task to register
        while bus.subscriber_count(ECHO_TOPIC) == 0 {
            tokio::task::yield_now().await;
        }
        bus.publish(ECHO_TOPIC, "app", json!({"n": 1}));
        bus.publish(ECHO_TOPIC, "app", json!("two"));

        let first = reports.get_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.sender, "echo");
        assert_eq!(first.payload, json!({"n": 1}));
        let second = reports.get_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.payload, json!("two"));

        task.abort();
    }
}
