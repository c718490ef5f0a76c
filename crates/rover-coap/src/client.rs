// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Client role: requests originated by this node.
//
// Confirmable requests are matched to their ACK/RST by message id in the
// receive loop; see `Server::complete_pending`.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::CoapError;
use crate::message::{Message, MessageType, Method};
use crate::option::{self, CoapOption};
use crate::response::Body;
use crate::server::Server;

/// Path used for presence announcements.
pub const ANNOUNCE_PATH: &str = "announce";

/// Build a request for `target` (`"a/b?k=v&flag"`).
pub fn build_request(
    mtype: MessageType,
    method: Method,
    message_id: u16,
    target: &str,
    body: Option<Body>,
) -> Message {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let mut msg = Message::new(mtype, method.code(), message_id, Vec::new());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        msg.options
            .push(CoapOption::new(option::URI_PATH, segment.as_bytes()));
    }
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        msg.options
            .push(CoapOption::new(option::URI_QUERY, pair.as_bytes()));
    }
    if let Some(body) = body {
        if let Some(format) = body.content_format() {
            msg.options
                .push(CoapOption::uint(option::CONTENT_FORMAT, format));
        }
        msg.payload = body.into_bytes();
    }
    msg
}

impl Server {
    /// Send a request without waiting for anything. Returns its message id.
    pub async fn transmit(
        &self,
        peer: SocketAddr,
        target: &str,
        method: Method,
        body: Option<Body>,
        confirmable: bool,
    ) -> Result<u16, CoapError> {
        let mtype = if confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        };
        let mid = self.shared.transport.next_message_id();
        let msg = build_request(mtype, method, mid, target, body);
        info!(%peer, %method, target, "tx request");
        self.shared.transport.send(peer, &msg).await?;
        Ok(mid)
    }

    /// Send a confirmable request and wait for its ACK or RST.
    ///
    /// Returns the peer's answer (a piggybacked response, an empty ACK or a
    /// reset). The pending entry is removed on every path.
    pub async fn transmit_confirmable(
        &self,
        peer: SocketAddr,
        target: &str,
        method: Method,
        body: Option<Body>,
        timeout: Duration,
    ) -> Result<Message, CoapError> {
        let mid = self.shared.transport.next_message_id();
        let msg = build_request(MessageType::Confirmable, method, mid, target, body);

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(mid, tx);

        if let Err(e) = self.shared.transport.send(peer, &msg).await {
            self.shared.pending.remove(&mid);
            return Err(e);
        }

        let result = tokio::time::timeout(timeout, rx).await;
        self.shared.pending.remove(&mid);

        match result {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) | Err(_) => {
                debug!(%peer, mid, target, "no acknowledgement");
                Err(CoapError::Timeout)
            }
        }
    }

    /// Broadcast `{"id": device_id}` to `announce` on the local segment.
    pub async fn broadcast_presence(&self, port: u16, device_id: &str) -> Result<u16, CoapError> {
        let peer = SocketAddr::from((Ipv4Addr::BROADCAST, port));
        self.transmit(
            peer,
            ANNOUNCE_PATH,
            Method::Post,
            Some(Body::Json(json!({ "id": device_id }))),
            false,
        )
        .await
    }

    /// Outbound confirmable requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_path_and_query() {
        let msg = build_request(
            MessageType::NonConfirmable,
            Method::Post,
            9,
            "/robot/drive?speed=3&fast",
            Some(Body::Json(json!({"x": 1}))),
        );
        assert_eq!(msg.uri_path(), "/robot/drive");
        let q = msg.uri_query();
        assert_eq!(q.get("speed"), Some(&json!(3)));
        assert_eq!(q.get("fast"), Some(&json!(true)));
        assert_eq!(msg.content_format(), Some(option::FORMAT_JSON));
        assert_eq!(msg.payload, br#"{"x":1}"#.to_vec());
        assert!(msg.token.is_empty());
    }

    #[test]
    fn test_build_request_no_body() {
        let msg = build_request(MessageType::Confirmable, Method::Get, 1, "announce", None);
        assert_eq!(msg.uri_path(), "/announce");
        assert!(msg.payload.is_empty());
        assert_eq!(msg.content_format(), None);
    }
}
