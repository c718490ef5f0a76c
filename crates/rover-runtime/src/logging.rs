// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Console logging with a filter that can be changed at runtime.

use parking_lot::Mutex;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("failed to apply log filter: {0}")]
    Reload(String),
}

/// Handle on the active console filter.
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    current: Mutex<String>,
}

impl LogControl {
    /// Install the global subscriber with `level` as the initial filter.
    ///
    /// An unparsable level falls back to `info`.
    pub fn init(level: &str) -> Self {
        let (filter, applied) = match EnvFilter::try_new(level) {
            Ok(filter) => (filter, level.to_string()),
            Err(_) => (EnvFilter::new("info"), "info".to_string()),
        };
        let (filter, handle) = reload::Layer::new(filter);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();

        Self {
            handle: Some(handle),
            current: Mutex::new(applied),
        }
    }

    /// A control that only records the level (no subscriber installed).
    pub fn detached(level: &str) -> Self {
        Self {
            handle: None,
            current: Mutex::new(level.to_string()),
        }
    }

    /// Current console filter.
    pub fn console_level(&self) -> String {
        self.current.lock().clone()
    }

    /// Replace the console filter.
    pub fn set_console_level(&self, level: &str) -> Result<String, LogError> {
        let filter = EnvFilter::try_new(level).map_err(|e| LogError::InvalidFilter {
            filter: level.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(handle) = &self.handle {
            handle
                .reload(filter)
                .map_err(|e| LogError::Reload(e.to_string()))?;
        }
        let mut current = self.current.lock();
        *current = level.to_string();
        tracing::info!(level, "console log level changed");
        Ok(current.clone())
    }
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("console", &self.console_level())
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_set_level() {
        let log = LogControl::detached("info");
        assert_eq!(log.set_console_level("debug").unwrap(), "debug");
        assert_eq!(log.console_level(), "debug");
    }

    #[test]
    fn test_invalid_filter_keeps_level() {
        let log = LogControl::detached("warn");
        let err = log.set_console_level("rover=verbose").unwrap_err();
        assert!(matches!(err, LogError::InvalidFilter { .. }));
        assert_eq!(log.console_level(), "warn");
    }
}
