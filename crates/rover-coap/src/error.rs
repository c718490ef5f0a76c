// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Error type for the protocol engine.
//
// Parse variants never reach the peer: a datagram that fails to parse is
// dropped without a response.

use thiserror::Error;

/// Errors produced by the protocol engine.
#[derive(Debug, Error)]
pub enum CoapError {
    /// Fewer bytes than the header, token or an option needs.
    #[error("datagram truncated")]
    Truncated,

    /// Version field other than 1.
    #[error("unsupported version: {0}")]
    BadVersion(u8),

    /// Token length nibble 9..=15.
    #[error("invalid token length: {0}")]
    InvalidTokenLength(usize),

    /// Option delta or length nibble 15 outside the payload marker.
    #[error("reserved option nibble")]
    ReservedNibble,

    /// Option number beyond 65535 after applying deltas.
    #[error("option number overflow")]
    OptionOverflow,

    /// Option value too long to encode.
    #[error("option value too long: {0} bytes")]
    OptionTooLong(usize),

    /// Socket or bind failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No acknowledgement for a confirmable transmission in time.
    #[error("timed out waiting for acknowledgement")]
    Timeout,

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `run` called twice.
    #[error("server already running")]
    AlreadyRunning,
}
