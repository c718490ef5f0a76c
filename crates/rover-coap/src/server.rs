// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Protocol engine: receive loop, block-wise reassembly, admission control,
// observe registration, routing and response transmission.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify, Semaphore};
use tracing::{debug, info, trace, warn};

use crate::blockwise::{BlockAssembler, BlockOutcome};
use crate::config::ServerConfig;
use crate::error::CoapError;
use crate::message::{Code, Message, MessageType, Method};
use crate::observe::ObserverRegistry;
use crate::option::{self, CoapOption};
use crate::request::{build_response, Exchange, Request};
use crate::response::{Body, HandlerError, Reply};
use crate::route::{RouteMatch, RouteTable};
use crate::transport::UdpTransport;

/// Pause after a socket receive error before reading again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Observe sequence numbers are 24 bits on the wire.
const OBSERVE_SEQ_MASK: u32 = 0x00FF_FFFF;

pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) transport: Arc<UdpTransport>,
    routes: RouteTable,
    blocks: Mutex<BlockAssembler>,
    observers: Mutex<ObserverRegistry>,
    workers: Arc<Semaphore>,
    observe_seq: AtomicU32,
    /// Outbound confirmable messages awaiting ACK/RST, by message id.
    pub(crate) pending: DashMap<u16, oneshot::Sender<Message>>,
    last_sweep: Mutex<Instant>,
    shutdown: Notify,
    running: AtomicBool,
}

/// The protocol server. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Server {
    pub(crate) shared: Arc<Shared>,
}

impl Server {
    /// Validate `config`, bind the socket and install `routes`.
    pub async fn bind(config: ServerConfig, routes: RouteTable) -> Result<Self, CoapError> {
        config.validate()?;
        let transport = UdpTransport::bind(config.bind_addr(), config.broadcast)?;
        info!(
            addr = %transport.local_addr()?,
            routes = routes.len(),
            max_workers = config.max_workers,
            "server bound"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                workers: Arc::new(Semaphore::new(config.max_workers)),
                config,
                transport: Arc::new(transport),
                routes,
                blocks: Mutex::new(BlockAssembler::new()),
                observers: Mutex::new(ObserverRegistry::new()),
                observe_seq: AtomicU32::new(0),
                pending: DashMap::new(),
                last_sweep: Mutex::new(Instant::now()),
                shutdown: Notify::new(),
                running: AtomicBool::new(false),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CoapError> {
        self.shared.transport.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Handlers currently executing.
    pub fn active_workers(&self) -> usize {
        self.shared.config.max_workers - self.shared.workers.available_permits()
    }

    /// Block transfers in progress.
    pub fn pending_blocks(&self) -> usize {
        self.shared.blocks.lock().len()
    }

    pub fn observer_count(&self, path: &str) -> usize {
        self.shared.observers.lock().observers(path).len()
    }

    /// Stop the receive loop.
    pub fn shutdown(&self) {
        self.shared.shutdown.notify_one();
    }

    /// Receive loop. Returns after [`Server::shutdown`].
    pub async fn run(&self) -> Result<(), CoapError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(CoapError::AlreadyRunning);
        }
        info!(addr = %self.local_addr()?, "server running");

        let mut buf = vec![0u8; self.shared.config.max_datagram_size];
        loop {
            let received = tokio::select! {
                res = self.shared.transport.recv_from(&mut buf) => Some(res),
                _ = self.shared.shutdown.notified() => None,
            };
            match received {
                Some(Ok((len, peer))) => self.handle_datagram(peer, &buf[..len]).await,
                Some(Err(e)) => {
                    warn!(error = %e, "receive failed");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
                None => {
                    info!("server shutting down");
                    break;
                }
            }
            self.maybe_sweep(Instant::now());
        }

        self.shared.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    async fn handle_datagram(&self, peer: SocketAddr, data: &[u8]) {
        let mut msg = match Message::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(%peer, error = %e, len = data.len(), "dropping malformed datagram");
                return;
            }
        };
        trace!(%peer, kind = msg.mtype.short_name(), code = %msg.code, mid = msg.message_id, "rx");

        if matches!(msg.mtype, MessageType::Acknowledgement | MessageType::Reset) {
            self.complete_pending(peer, msg);
            return;
        }

        let exchange = Arc::new(Exchange::new(self.shared.transport.clone(), peer, &msg));

        let Some(method) = Method::from_code(msg.code) else {
            debug!(%peer, code = %msg.code, "not a supported request");
            if msg.is_confirmable() && msg.code.is_request() {
                self.reply(&exchange, Code::METHOD_NOT_ALLOWED, None, Vec::new()).await;
            }
            return;
        };

        if let Some(block) = msg.block1() {
            let outcome = self.shared.blocks.lock().accept(
                peer,
                &msg.token,
                block,
                &msg.payload,
                Instant::now(),
            );
            match outcome {
                BlockOutcome::Continue => {
                    trace!(%peer, num = block.num, "block stored");
                    self.reply(&exchange, Code::CONTINUE, None, vec![block.to_option()])
                        .await;
                    return;
                }
                BlockOutcome::Rejected(reason) => {
                    debug!(%peer, ?reason, "block rejected");
                    self.reply(&exchange, Code::REQUEST_ENTITY_INCOMPLETE, None, Vec::new())
                        .await;
                    return;
                }
                BlockOutcome::Complete(body) => {
                    debug!(%peer, len = body.len(), "block transfer complete");
                    msg.payload = body;
                }
            }
        }

        let permit = match self.shared.workers.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%peer, path = %msg.uri_path(), "worker budget exhausted");
                self.reply(&exchange, Code::SERVICE_UNAVAILABLE, None, Vec::new())
                    .await;
                return;
            }
        };

        let server = self.clone();
        tokio::spawn(async move {
            server.dispatch(exchange, method, msg).await;
            drop(permit);
        });
    }

    /// Observe, route, run the handler and send its result.
    async fn dispatch(&self, exchange: Arc<Exchange>, method: Method, msg: Message) {
        let peer = exchange.peer();
        let path = msg.uri_path();

        let mut observe = Vec::new();
        if method == Method::Get {
            match msg.observe() {
                Some(option::OBSERVE_DEREGISTER) => {
                    if self.shared.observers.lock().deregister(&path, peer) {
                        debug!(%peer, %path, "observer removed");
                    }
                }
                Some(_) => {
                    let added =
                        self.shared
                            .observers
                            .lock()
                            .register(&path, peer, &msg.token, Instant::now());
                    if added {
                        debug!(%peer, %path, "observer added");
                    }
                    let seq = self.shared.observe_seq.load(Ordering::Relaxed);
                    observe.push(CoapOption::uint(option::OBSERVE, seq));
                }
                None => {}
            }
        }

        let handler = match self.shared.routes.lookup(&path, method) {
            RouteMatch::Found(handler) => handler,
            RouteMatch::NotFound => {
                if exchange.is_confirmable() {
                    self.reply(&exchange, Code::NOT_FOUND, None, Vec::new()).await;
                } else {
                    debug!(%peer, %path, "no route for non-confirmable request");
                }
                return;
            }
            RouteMatch::MethodNotAllowed => {
                if exchange.is_confirmable() {
                    self.reply(&exchange, Code::METHOD_NOT_ALLOWED, None, Vec::new())
                        .await;
                } else {
                    debug!(%peer, %path, %method, "method not allowed");
                }
                return;
            }
        };

        debug!(%peer, %method, %path, "dispatch");
        let request = Request::new(exchange.clone(), method, path.clone(), msg);
        let outcome = match tokio::spawn(handler.call(request)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(HandlerError::internal("handler panicked")),
            Err(_) => Err(HandlerError::internal("handler cancelled")),
        };

        let (code, body) = match outcome {
            Ok(Reply::Deferred) => return,
            Ok(Reply::Status(code)) => (code, None),
            Ok(Reply::Body(body)) => (method.default_success(), Some(body)),
            Ok(Reply::Content(code, body)) => (code, Some(body)),
            Err(e) => {
                warn!(%peer, %path, code = %e.code, error = %e.detail, "handler failed");
                (e.code, Some(Body::message(e.detail)))
            }
        };
        self.reply(&exchange, code, body, observe).await;
    }

    async fn reply(&self, exchange: &Exchange, code: Code, body: Option<Body>, extra: Vec<CoapOption>) {
        if let Err(e) = exchange.respond(code, body, extra).await {
            warn!(peer = %exchange.peer(), %code, error = %e, "send failed");
        }
    }

    fn complete_pending(&self, peer: SocketAddr, msg: Message) {
        match self.shared.pending.remove(&msg.message_id) {
            Some((_, tx)) => {
                if msg.code.is_error() {
                    debug!(%peer, mid = msg.message_id, code = %msg.code, "peer answered with an error");
                } else if msg.code.is_success() {
                    trace!(%peer, mid = msg.message_id, code = %msg.code, "peer answered");
                } else {
                    trace!(%peer, mid = msg.message_id, kind = msg.mtype.short_name(), "exchange completed");
                }
                let _ = tx.send(msg);
            }
            None => {
                debug!(%peer, mid = msg.message_id, kind = msg.mtype.short_name(), "unmatched ack/reset");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    fn maybe_sweep(&self, now: Instant) {
        {
            let mut last = self.shared.last_sweep.lock();
            if now.saturating_duration_since(*last) < self.shared.config.sweep_interval() {
                return;
            }
            *last = now;
        }
        self.sweep(now);
    }

    /// Drop idle block transfers and stale observers.
    pub fn sweep(&self, now: Instant) {
        let purged = self
            .shared
            .blocks
            .lock()
            .sweep(now, self.shared.config.block_idle_timeout());
        if purged > 0 {
            debug!(purged, "idle block transfers discarded");
        }
        if let Some(ttl) = self.shared.config.observer_ttl() {
            let evicted = self.shared.observers.lock().evict_older_than(now, ttl);
            if evicted > 0 {
                debug!(evicted, "stale observers evicted");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Push a 2.05 notification to every observer of `path`.
    pub async fn notify_observers(&self, path: &str, body: Body) -> usize {
        let observers = self.shared.observers.lock().observers(path);
        if observers.is_empty() {
            return 0;
        }

        let seq = self
            .shared
            .observe_seq
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
            & OBSERVE_SEQ_MASK;

        let mut sent = 0;
        for obs in observers {
            let header = Message::new(
                MessageType::NonConfirmable,
                Code::CONTENT,
                self.shared.transport.next_message_id(),
                obs.token.clone(),
            );
            let msg = build_response(
                header,
                Some(body.clone()),
                vec![CoapOption::uint(option::OBSERVE, seq)],
            );
            match self.shared.transport.send(obs.peer, &msg).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(peer = %obs.peer, %path, error = %e, "notification failed"),
            }
        }
        debug!(%path, seq, sent, "observers notified");
        sent
    }

    /// Separate NON response to an earlier request identified by `token`.
    pub async fn send_separate(
        &self,
        peer: SocketAddr,
        token: &[u8],
        code: Code,
        body: Option<Body>,
    ) -> Result<(), CoapError> {
        let header = Message::new(
            MessageType::NonConfirmable,
            code,
            self.shared.transport.next_message_id(),
            token.to_vec(),
        );
        self.shared
            .transport
            .send(peer, &build_response(header, body, Vec::new()))
            .await
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.local_addr().ok())
            .field("routes", &self.shared.routes)
            .field("running", &self.is_running())
            .finish()
    }
}
