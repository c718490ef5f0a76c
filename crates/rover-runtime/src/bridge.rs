// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply bridge between the protocol server and the message bus.
//!
//! A command publishes `payload` on `topic`. When a reply is requested the
//! bridge acknowledges the request at once, waits for one message on
//! `reply_topic` and answers with a separate response.

use rover_bus::{BusMessage, MessageBus, Publisher, QueueError, Subscriber};
use rover_coap::{Code, HandlerError, HandlerResult, Reply, Request};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Sender identity used for commands published by the bridge.
pub const BRIDGE_SENDER: &str = "coap";

/// Identity of the temporary reply subscriber.
const REPLY_SUBSCRIBER: &str = "messagebus_handler";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Timeout waiting for reply")]
    Timeout,

    #[error("Reply subscription closed")]
    Closed,

    #[error("Bad Request wait_reply without reply_topic")]
    MissingReplyTopic,
}

/// Body of a `/app/messagebus` request.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeCommand {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub reply_topic: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub reply_timeout: Option<f64>,
    #[serde(default)]
    pub wait_reply: Option<String>,
}

impl BridgeCommand {
    /// Topic to wait on, if a reply was requested.
    pub fn reply_topic(&self) -> Result<Option<&str>, BridgeError> {
        let wants = self
            .wait_reply
            .as_deref()
            .is_some_and(|w| w.eq_ignore_ascii_case("yes"));
        match self.reply_topic.as_deref() {
            Some(topic) => Ok(Some(topic)),
            None if wants => Err(BridgeError::MissingReplyTopic),
            None => Ok(None),
        }
    }

    /// `reply_timeout`, or `default` when absent, negative, not finite or
    /// too large for a `Duration`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.reply_timeout
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
            .unwrap_or(default)
    }
}

/// A subscription opened before the command was published.
///
/// [`PendingReply::wait`] releases the subscription whatever the outcome.
pub struct PendingReply {
    sub: Subscriber,
}

impl PendingReply {
    pub async fn wait(self, timeout: Duration) -> Result<BusMessage, BridgeError> {
        let outcome = self.sub.get_timeout(timeout).await;
        self.sub.close();
        match outcome {
            Ok(msg) => Ok(msg),
            Err(QueueError::Timeout) => Err(BridgeError::Timeout),
            Err(_) => Err(BridgeError::Closed),
        }
    }
}

/// Publishes commands and correlates replies.
#[derive(Clone, Debug)]
pub struct Bridge {
    bus: MessageBus,
    publisher: Publisher,
    default_timeout: Duration,
}

impl Bridge {
    pub fn new(bus: MessageBus, default_timeout: Duration) -> Self {
        Self {
            publisher: bus.publisher(BRIDGE_SENDER),
            bus,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Publish without waiting.
    pub fn send(&self, topic: &str, payload: Value) -> usize {
        self.publisher.publish(topic, payload)
    }

    /// Subscribe to `reply_topic`, then publish the command.
    ///
    /// Subscribing first means a responder that answers immediately cannot
    /// be missed.
    pub fn begin(&self, topic: &str, payload: Value, reply_topic: &str) -> PendingReply {
        let sub = self.bus.subscriber(REPLY_SUBSCRIBER, [reply_topic]);
        let receivers = self.publisher.publish(topic, payload);
        debug!(topic, reply_topic, receivers, "command published, awaiting reply");
        PendingReply { sub }
    }

    /// Publish and wait for one reply.
    pub async fn request(
        &self,
        topic: &str,
        payload: Value,
        reply_topic: &str,
        timeout: Duration,
    ) -> Result<BusMessage, BridgeError> {
        self.begin(topic, payload, reply_topic).wait(timeout).await
    }

    /// `/app/messagebus` handler.
    pub async fn handle(&self, req: Request) -> HandlerResult {
        let cmd: BridgeCommand = req.json()?;
        let reply_topic = cmd
            .reply_topic()
            .map_err(|e| HandlerError::bad_request(e.to_string()))?
            .map(str::to_string);

        let Some(reply_topic) = reply_topic else {
            self.send(&cmd.topic, cmd.payload);
            return Ok(Reply::message(Code::CHANGED, "OK"));
        };

        let timeout = cmd.timeout(self.default_timeout);
        let pending = self.begin(&cmd.topic, cmd.payload, &reply_topic);
        if let Err(e) = req.send_ack().await {
            warn!(peer = %req.peer(), error = %e, "failed to acknowledge bridge request");
        }

        match pending.wait(timeout).await {
            Ok(msg) => Ok(Reply::json(
                Code::CONTENT,
                json!({
                    "topic": msg.topic,
                    "sender_id": msg.sender,
                    "message": msg.payload,
                }),
            )),
            Err(e) => {
                warn!(topic = %cmd.topic, %reply_topic, ?timeout, error = %e, "no reply");
                Err(HandlerError::internal(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(text: &str) -> BridgeCommand {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_reply_topic_rules() {
        assert_eq!(command(r#"{"topic":"t"}"#).reply_topic(), Ok(None));
        assert_eq!(
            command(r#"{"topic":"t","reply_topic":"r"}"#).reply_topic(),
            Ok(Some("r"))
        );
        assert_eq!(
            command(r#"{"topic":"t","wait_reply":"YES"}"#).reply_topic(),
            Err(BridgeError::MissingReplyTopic)
        );
        assert_eq!(
            command(r#"{"topic":"t","wait_reply":"no"}"#).reply_topic(),
            Ok(None)
        );
    }

    #[test]
    fn test_timeout_default_and_override() {
        let default = Duration::from_secs(2);
        assert_eq!(command(r#"{"topic":"t"}"#).timeout(default), default);
        assert_eq!(
            command(r#"{"topic":"t","reply_timeout":0.25}"#).timeout(default),
            Duration::from_millis(250)
        );
        assert_eq!(
            command(r#"{"topic":"t","reply_timeout":-1}"#).timeout(default),
            default
        );
    }

    #[test]
    fn test_oversized_timeout_falls_back_to_default() {
        let default = Duration::from_secs(2);
        let cmd = command(r#"{"topic":"t","reply_topic":"r","reply_timeout":1e20}"#);
        assert_eq!(cmd.timeout(default), default);
    }

    #[tokio::test]
    async fn test_request_gets_reply() {
        let bus = MessageBus::new();
        let bridge = Bridge::new(bus.clone(), Duration::from_secs(2));
        let servo = bus.subscriber("servo", ["servo"]);
        let responder = {
            let publisher = bus.publisher("servo");
            tokio::spawn(async move {
                let cmd = servo.get().await.unwrap();
                publisher.publish("servo_report", json!({"angle": cmd.payload["angle"]}));
            })
        };

        let reply = bridge
            .request("servo", json!({"angle": 45}), "servo_report", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.topic, "servo_report");
        assert_eq!(reply.sender, "servo");
        assert_eq!(reply.payload, json!({"angle": 45}));
        assert_eq!(bus.subscriber_count("servo_report"), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_immediate_responder_is_not_missed() {
        let bus = MessageBus::new();
        let bridge = Bridge::new(bus.clone(), Duration::from_secs(2));
        let pending = bridge.begin("calibrate", json!({}), "calibrate_report");
        // reply lands before anyone awaits
        bus.publish("calibrate_report", "imu", json!("done"));
        let reply = pending.wait(Duration::from_millis(10)).await.unwrap();
        assert_eq!(reply.payload, json!("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_subscription() {
        let bus = MessageBus::new();
        let bridge = Bridge::new(bus.clone(), Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        let res = bridge
            .request("scan", json!({}), "scan_report", Duration::from_secs(1))
            .await;
        assert_eq!(res, Err(BridgeError::Timeout));
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(bus.subscriber_count("scan_report"), 0);
        // a late reply reaches nobody
        assert_eq!(bus.publish("scan_report", "lidar", json!({"late": true})), 0);
    }

    #[tokio::test]
    async fn test_only_first_reply_consumed() {
        let bus = MessageBus::new();
        let bridge = Bridge::new(bus.clone(), Duration::from_secs(2));
        let pending = bridge.begin("move", json!({}), "move_report");
        bus.publish("move_report", "drive", json!(1));
        bus.publish("move_report", "drive", json!(2));
        let reply = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.payload, json!(1));
        assert_eq!(bus.subscriber_count("move_report"), 0);
    }
}
