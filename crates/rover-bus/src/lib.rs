// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rover message bus
//!
//! Topic-keyed publish/subscribe used by the rover's control tasks to talk to
//! each other and to the protocol server.
//!
//! # Model
//!
//! - A [`MessageBus`] is an explicitly constructed context object passed to
//!   every task; there is no global instance.
//! - A [`Subscriber`] owns one FIFO [`Queue`] and may be registered on many
//!   topics. Each message lands in the queue exactly once per registration.
//! - A [`Publisher`] carries a fixed sender identity.
//! - Delivery is to the subscribers present at publish time; there is no
//!   replay for late subscribers.
//!
//! # Quick Start
//!
//! ```rust
//! use rover_bus::MessageBus;
//! use serde_json::json;
//!
//! let bus = MessageBus::new();
//! let servo = bus.subscriber("servo", ["servo"]);
//! let app = bus.publisher("app");
//!
//! app.publish("servo", json!({"angle": 90}));
//! let msg = servo.get_nowait().expect("queued");
//! assert_eq!(msg.sender, "app");
//! ```

pub mod bus;
pub mod publisher;
pub mod queue;
pub mod subscriber;
pub mod supervisor;

pub use bus::{BusMessage, MessageBus};
pub use publisher::Publisher;
pub use queue::{Queue, QueueError};
pub use subscriber::Subscriber;
pub use supervisor::supervise;
