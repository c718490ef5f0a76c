// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application routes served by `roverd`.

use std::sync::Arc;

use rover_bus::{MessageBus, Publisher};
use rover_coap::{Body, Code, HandlerError, HandlerResult, Method, Reply, Request, RouteTable};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::bridge::Bridge;
use crate::config::RuntimeConfig;
use crate::logging::LogControl;

pub const PING: &str = "/app/ping";
pub const QUIT: &str = "/app/quit";
pub const OTA_ENTER: &str = "/ota/enter";
pub const MESSAGEBUS: &str = "/app/messagebus";
pub const LOG_LEVEL: &str = "/app/log/level";

/// Lifecycle topics watched by the main task.
pub const QUIT_TOPIC: &str = "quit";
pub const RESTART_TOPIC: &str = "restart";

/// Marker written before an OTA restart.
pub const OTA_MARKER: &str = "enter";

/// State shared by every route handler.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub bus: MessageBus,
    pub publisher: Publisher,
    pub bridge: Bridge,
    pub log: Arc<LogControl>,
    pub config: Arc<RuntimeConfig>,
}

impl AppContext {
    pub fn new(bus: MessageBus, config: Arc<RuntimeConfig>, log: Arc<LogControl>) -> Self {
        Self {
            publisher: bus.publisher("app"),
            bridge: Bridge::new(bus.clone(), config.default_reply_timeout()),
            bus,
            log,
            config,
        }
    }
}

/// Build the route table. Called once before the server starts.
pub fn build_routes(ctx: AppContext) -> RouteTable {
    let quit = ctx.clone();
    let ota = ctx.clone();
    let bridge = ctx.bridge.clone();
    let log = ctx.log.clone();

    RouteTable::new()
        .route(PING, &[Method::Get], ping)
        .route(QUIT, &[Method::Post], move |req| app_quit(quit.clone(), req))
        .route(OTA_ENTER, &[Method::Post], move |req| ota_enter(ota.clone(), req))
        .route(MESSAGEBUS, &[Method::Post], move |req| {
            let bridge = bridge.clone();
            async move { bridge.handle(req).await }
        })
        .route(LOG_LEVEL, &[Method::Post], move |req| log_level(log.clone(), req))
}

async fn ping(_req: Request) -> HandlerResult {
    Ok(Reply::message(Code::CONTENT, "OK"))
}

async fn app_quit(ctx: AppContext, req: Request) -> HandlerResult {
    info!(peer = %req.peer(), "quit requested");
    ctx.publisher.publish(QUIT_TOPIC, json!({}));
    Ok(Reply::message(Code::CHANGED, "Shutting down"))
}

/// Write the marker, answer, then ask for a restart after the configured
/// delay so the response can leave the socket first.
async fn ota_enter(ctx: AppContext, req: Request) -> HandlerResult {
    let marker = &ctx.config.ota_marker_path;
    tokio::fs::write(marker, OTA_MARKER).await.map_err(|e| {
        warn!(path = %marker.display(), error = %e, "failed to write OTA marker");
        HandlerError::internal(e.to_string())
    })?;
    info!(path = %marker.display(), "OTA marker written");

    if let Err(e) = req.respond_now(Code::CHANGED, Body::message("OK")).await {
        warn!(peer = %req.peer(), error = %e, "failed to answer OTA request");
    }

    tokio::time::sleep(ctx.config.ota_restart_delay()).await;
    ctx.publisher.event(RESTART_TOPIC);
    Ok(Reply::Deferred)
}

// A `network` level may also be sent; there is no network sink, so it is ignored.
#[derive(Debug, Deserialize)]
struct LogLevelCommand {
    console: Option<String>,
}

async fn log_level(log: Arc<LogControl>, req: Request) -> HandlerResult {
    let cmd: LogLevelCommand = req.json()?;
    let level = cmd
        .console
        .ok_or_else(|| HandlerError::bad_request("Bad Request missing console level"))?;
    let current = log
        .set_console_level(&level)
        .map_err(|e| HandlerError::bad_request(e.to_string()))?;
    Ok(Reply::json(Code::CHANGED, json!({ "console": current })))
}
