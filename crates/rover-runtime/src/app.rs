// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process lifecycle: wire the bus, the routes and the server together and
//! run until a quit or restart is requested.

use std::net::SocketAddr;
use std::sync::Arc;

use rover_bus::{supervise, MessageBus, Subscriber};
use rover_coap::{CoapError, Server};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ConfigError, RuntimeConfig};
use crate::logging::LogControl;
use crate::routes::{build_routes, AppContext, QUIT_TOPIC, RESTART_TOPIC};
use crate::tasks::{echo_task, ECHO_TOPIC};

/// Exit status asking the service manager to start the process again.
pub const RESTART_EXIT_CODE: u8 = 75;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("protocol error: {0}")]
    Coap(#[from] CoapError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Task(String),
}

/// Why [`App::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    Restart,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Shutdown => 0,
            Exit::Restart => RESTART_EXIT_CODE,
        }
    }
}

/// A bound, not yet running daemon.
pub struct App {
    config: Arc<RuntimeConfig>,
    bus: MessageBus,
    server: Server,
    lifecycle: Subscriber,
}

impl App {
    /// Bind the server and install the routes.
    pub async fn start(config: RuntimeConfig, log: Arc<LogControl>) -> Result<Self, RuntimeError> {
        config.validate()?;
        let config = Arc::new(config);
        let bus = MessageBus::new();
        // registered before any request can be served
        let lifecycle = bus.subscriber("main", [QUIT_TOPIC, RESTART_TOPIC]);

        let ctx = AppContext::new(bus.clone(), config.clone(), log);
        let server = Server::bind(config.server.clone(), build_routes(ctx)).await?;
        info!(addr = %server.local_addr()?, device = %config.device_id, "roverd bound");

        Ok(Self {
            config,
            bus,
            server,
            lifecycle,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RuntimeError> {
        Ok(self.server.local_addr()?)
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Serve until `quit`, `restart`, Ctrl+C or a server failure.
    pub async fn run(self) -> Result<Exit, RuntimeError> {
        let server = self.server.clone();
        let mut server_task = tokio::spawn(async move { server.run().await });

        let echo = self.config.echo_task.then(|| {
            let bus = self.bus.clone();
            let delay = self.config.supervisor_restart_delay();
            tokio::spawn(async move {
                supervise(ECHO_TOPIC, delay, move || echo_task(bus.clone())).await
            })
        });

        if self.config.announce_on_start {
            self.announce().await;
        }

        let mut server_done = false;
        let outcome = tokio::select! {
            msg = self.lifecycle.get() => match msg {
                Ok(msg) if msg.topic == RESTART_TOPIC => {
                    info!(sender = %msg.sender, "restart requested");
                    Ok(Exit::Restart)
                }
                Ok(msg) => {
                    info!(sender = %msg.sender, "quit requested");
                    Ok(Exit::Shutdown)
                }
                Err(e) => Err(RuntimeError::Task(e.to_string())),
            },
            res = tokio::signal::ctrl_c() => {
                info!("interrupted");
                res.map(|_| Exit::Shutdown).map_err(RuntimeError::from)
            }
            res = &mut server_task => {
                server_done = true;
                match res {
                    Ok(Ok(())) => Ok(Exit::Shutdown),
                    Ok(Err(e)) => Err(e.into()),
                    Err(join) => Err(RuntimeError::Task(join.to_string())),
                }
            }
        };

        self.server.shutdown();
        if !server_done {
            if let Err(e) = server_task.await {
                warn!(error = %e, "server task did not stop cleanly");
            }
        }
        if let Some(echo) = echo {
            echo.abort();
        }
        self.lifecycle.close();

        match &outcome {
            Ok(exit) => info!(?exit, "roverd stopped"),
            Err(e) => error!(error = %e, "roverd failed"),
        }
        outcome
    }

    async fn announce(&self) {
        let port = self.config.server.port;
        if port == 0 {
            return;
        }
        match self.server.broadcast_presence(port, &self.config.device_id).await {
            Ok(mid) => info!(port, mid, "presence announced"),
            Err(e) => warn!(port, error = %e, "presence announcement failed"),
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("device_id", &self.config.device_id)
            .field("server", &self.server)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_coap::ServerConfig;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            announce_on_start: false,
            server: ServerConfig::localhost(),
            ..Default::default()
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Exit::Shutdown.code(), 0);
        assert_eq!(Exit::Restart.code(), 75);
    }

    #[tokio::test]
    async fn test_quit_event_stops_app() {
        let app = App::start(config(), Arc::new(LogControl::detached("info")))
            .await
            .unwrap();
        let bus = app.bus().clone();
        let run = tokio::spawn(app.run());
        tokio::task::yield_now().await;
        bus.publish(QUIT_TOPIC, "test", serde_json::json!({}));
        assert_eq!(run.await.unwrap().unwrap(), Exit::Shutdown);
    }

    #[tokio::test]
    async fn test_restart_event_requests_restart() {
        let app = App::start(config(), Arc::new(LogControl::detached("info")))
            .await
            .unwrap();
        let bus = app.bus().clone();
        let run = tokio::spawn(app.run());
        bus.publish(RESTART_TOPIC, "test", serde_json::Value::Null);
        assert_eq!(run.await.unwrap().unwrap(), Exit::Restart);
    }

    #[tokio::test]
    async fn test_invalid_config_refused() {
        let mut cfg = config();
        cfg.device_id = String::new();
        let err = App::start(cfg, Arc::new(LogControl::detached("info")))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
