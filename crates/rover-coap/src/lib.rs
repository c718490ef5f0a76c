// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CoAP-style request/response engine over UDP.
//!
//! A compact binary protocol server for an embedded controller: confirmable
//! and non-confirmable requests, piggybacked and separate responses,
//! block-wise request bodies, observe notifications and a bounded pool of
//! concurrently running handlers.
//!
//! # Request pipeline
//!
//! ```text
//! datagram -> parse -> ACK/RST? -> complete pending client exchange
//!                   -> Block1?  -> reassemble (2.31 / 4.08 / continue)
//!                   -> admission (5.03 when the worker budget is spent)
//!                   -> observe register/deregister (GET)
//!                   -> route (4.04 / 4.05)
//!                   -> handler -> piggybacked ACK | separate NON
//! ```
//!
//! # Not covered
//!
//! DTLS, retransmission of confirmable messages, duplicate detection,
//! multicast discovery and Block2 responses.

pub mod blockwise;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod observe;
pub mod option;
pub mod request;
pub mod response;
pub mod route;
pub mod server;
pub mod transport;

pub use blockwise::{BlockAssembler, BlockOutcome, BlockRejection};
pub use client::build_request;
pub use config::ServerConfig;
pub use error::CoapError;
pub use message::{Code, Message, MessageType, Method, DEFAULT_PORT};
pub use observe::{Observer, ObserverRegistry};
pub use option::{BlockOption, CoapOption};
pub use request::{Exchange, Request};
pub use response::{Body, HandlerError, HandlerResult, Reply};
pub use route::{Handler, HandlerFuture, RouteMatch, RouteTable};
pub use server::Server;
pub use transport::UdpTransport;
