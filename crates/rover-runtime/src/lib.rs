// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rover control-plane daemon.
//!
//! Glues the protocol engine ([`rover_coap`]) to the message bus
//! ([`rover_bus`]): application routes, the `/app/messagebus` request/reply
//! bridge, the built-in `echo` task, runtime log level control and the
//! quit/restart lifecycle.
//!
//! # Example
//!
//! ```rust,no_run
//! use rover_runtime::{App, Exit, LogControl, RuntimeConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::default();
//! let log = Arc::new(LogControl::init(&config.log_level));
//! let app = App::start(config, log).await?;
//! if app.run().await? == Exit::Restart {
//!     std::process::exit(75);
//! }
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod bridge;
pub mod config;
pub mod logging;
pub mod routes;
pub mod tasks;

pub use app::{App, Exit, RuntimeError, RESTART_EXIT_CODE};
pub use bridge::{Bridge, BridgeCommand, BridgeError, PendingReply};
pub use config::{ConfigError, RuntimeConfig};
pub use logging::{LogControl, LogError};
pub use routes::{build_routes, AppContext};
