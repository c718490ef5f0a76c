// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::bus::MessageBus;
use serde_json::Value;

/// Sending side of the bus with a fixed sender identity.
#[derive(Clone, Debug)]
pub struct Publisher {
    bus: MessageBus,
    id: String,
}

impl Publisher {
    pub(crate) fn new(bus: MessageBus, id: String) -> Self {
        Self { bus, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Publish `payload` on `topic`; returns the number of receivers.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        self.bus.publish(topic, &self.id, payload)
    }

    /// Publish a payload-less notification.
    pub fn event(&self, topic: &str) -> usize {
        self.bus.publish(topic, &self.id, Value::Null)
    }
}
