// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Inbound request and the exchange it belongs to.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::CoapError;
use crate::message::{Code, Message, MessageType, Method};
use crate::option::{self, CoapOption};
use crate::response::{Body, HandlerError};
use crate::transport::UdpTransport;

/// Addressing for one request/response exchange.
///
/// Tracks whether the request was already acknowledged so that later
/// responses go out as separate messages instead of piggybacked ACKs.
#[derive(Debug)]
pub struct Exchange {
    peer: SocketAddr,
    mtype: MessageType,
    message_id: u16,
    token: Vec<u8>,
    acknowledged: AtomicBool,
    transport: Arc<UdpTransport>,
}

impl Exchange {
    pub(crate) fn new(transport: Arc<UdpTransport>, peer: SocketAddr, msg: &Message) -> Self {
        Self {
            peer,
            mtype: msg.mtype,
            message_id: msg.message_id,
            token: msg.token.clone(),
            acknowledged: AtomicBool::new(false),
            transport,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }

    pub fn is_confirmable(&self) -> bool {
        self.mtype == MessageType::Confirmable
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    /// Send an empty ACK for a confirmable request, once.
    pub async fn acknowledge(&self) -> Result<(), CoapError> {
        if !self.is_confirmable() || self.acknowledged.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let ack = Message::new(
            MessageType::Acknowledgement,
            Code::EMPTY,
            self.message_id,
            Vec::new(),
        );
        self.transport.send(self.peer, &ack).await
    }

    /// Send the response for this exchange.
    ///
    /// Already acknowledged: separate NON response on the same token.
    /// Confirmable: piggybacked on the ACK. Otherwise a NON response.
    pub async fn respond(
        &self,
        code: Code,
        body: Option<Body>,
        extra: Vec<CoapOption>,
    ) -> Result<(), CoapError> {
        let piggyback = self.is_confirmable() && !self.acknowledged.swap(true, Ordering::AcqRel);
        let msg = if piggyback {
            Message::new(MessageType::Acknowledgement, code, self.message_id, self.token.clone())
        } else {
            Message::new(
                MessageType::NonConfirmable,
                code,
                self.transport.next_message_id(),
                self.token.clone(),
            )
        };
        self.transport.send(self.peer, &build_response(msg, body, extra)).await
    }
}

/// Attach options and payload to a response header.
pub(crate) fn build_response(mut msg: Message, body: Option<Body>, extra: Vec<CoapOption>) -> Message {
    msg.options = extra;
    if let Some(body) = body {
        if let Some(format) = body.content_format() {
            msg.options.push(CoapOption::uint(option::CONTENT_FORMAT, format));
        }
        msg.payload = body.into_bytes();
    }
    msg
}

/// A routed request handed to a handler.
#[derive(Debug)]
pub struct Request {
    exchange: Arc<Exchange>,
    method: Method,
    path: String,
    query: Map<String, Value>,
    options: Vec<CoapOption>,
    payload: Vec<u8>,
}

impl Request {
    pub(crate) fn new(exchange: Arc<Exchange>, method: Method, path: String, msg: Message) -> Self {
        Self {
            exchange,
            method,
            path,
            query: msg.uri_query(),
            options: msg.options,
            payload: msg.payload,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.exchange.peer()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> &[u8] {
        self.exchange.token()
    }

    pub fn is_confirmable(&self) -> bool {
        self.exchange.is_confirmable()
    }

    pub fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    pub fn options(&self) -> &[CoapOption] {
        &self.options
    }

    /// Reassembled body.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        if self.payload.is_empty() {
            return Err(HandlerError::bad_request("Bad Request missing body"));
        }
        serde_json::from_slice(&self.payload)
            .map_err(|e| HandlerError::bad_request(format!("Bad Request invalid JSON: {}", e)))
    }

    /// Acknowledge now; the handler's result is then sent separately.
    pub async fn send_ack(&self) -> Result<(), CoapError> {
        self.exchange.acknowledge().await
    }

    /// Answer before the handler returns. Pair with `Reply::Deferred`.
    pub async fn respond_now(&self, code: Code, body: Body) -> Result<(), CoapError> {
        self.exchange.respond(code, Some(body), Vec::new()).await
    }

    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }
}
