// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! roverd - rover control-plane daemon
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:5683, 10 workers
//! roverd
//!
//! # Configuration file with overrides
//! roverd --config roverd.toml --port 5684 --log-level debug
//!
//! # Write a default configuration file
//! roverd gen-config --output roverd.toml
//! ```
//!
//! Exits with status 75 when an OTA restart was requested.

use clap::{Parser, Subcommand};
use rover_runtime::{App, LogControl, RuntimeConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// Rover control-plane daemon
#[derive(Parser, Debug)]
#[command(name = "roverd")]
#[command(about = "Rover control plane - CoAP-style server bridged to the message bus")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrently running handlers
    #[arg(long)]
    max_workers: Option<usize>,

    /// Log filter (trace, debug, info, warn, error or EnvFilter directives)
    #[arg(long)]
    log_level: Option<String>,

    /// Skip the presence broadcast at startup
    #[arg(long)]
    no_announce: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "roverd.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;
    let log = Arc::new(LogControl::init(&config.log_level));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.device_id,
        workers = config.server.max_workers,
        "starting roverd"
    );

    let app = App::start(config, log).await?;
    let exit = app.run().await?;
    Ok(ExitCode::from(exit.code()))
}

fn build_config(args: &Args) -> Result<RuntimeConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(workers) = args.max_workers {
        config.server.max_workers = workers;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if args.no_announce {
        config.announce_on_start = false;
    }

    config.validate()?;
    Ok(config)
}

fn cmd_gen_config(output: PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let content = format!(
        "# roverd configuration\n# Generated by roverd gen-config\n\n{}",
        RuntimeConfig::default().to_toml()?
    );
    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(path: PathBuf) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match RuntimeConfig::from_file(&path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Device:  {}", config.device_id);
            println!(
                "Server:  {}:{} ({} workers)",
                config.server.bind_address, config.server.port, config.server.max_workers
            );
            println!("OTA:     {}", config.ota_marker_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
