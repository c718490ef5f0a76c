// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Handler results and response bodies.

use serde_json::{json, Value};
use thiserror::Error;

use crate::message::Code;
use crate::option;

/// Response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Serialized as compact JSON, Content-Format 50.
    Json(Value),
    /// UTF-8 text, Content-Format 0.
    Text(String),
    /// Passed through untouched, no Content-Format.
    Raw(Vec<u8>),
}

impl Body {
    /// `{"text": <message>}`, the body shape every built-in route uses.
    pub fn message(text: impl Into<String>) -> Self {
        Body::Json(json!({ "text": text.into() }))
    }

    pub fn content_format(&self) -> Option<u32> {
        match self {
            Body::Json(_) => Some(option::FORMAT_JSON),
            Body::Text(_) => Some(option::FORMAT_TEXT),
            Body::Raw(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Json(v) => v.to_string().into_bytes(),
            Body::Text(s) => s.into_bytes(),
            Body::Raw(b) => b,
        }
    }
}

impl From<Value> for Body {
    fn from(v: Value) -> Self {
        Body::Json(v)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Raw(b)
    }
}

/// What a handler wants sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The handler already answered (or deliberately stays silent).
    Deferred,
    /// Code only, no payload.
    Status(Code),
    /// Payload with the method's default success code.
    Body(Body),
    /// Payload with an explicit code.
    Content(Code, Body),
}

impl Reply {
    pub fn json(code: Code, value: Value) -> Self {
        Reply::Content(code, Body::Json(value))
    }

    /// `code` with a `{"text": ...}` body.
    pub fn message(code: Code, text: impl Into<String>) -> Self {
        Reply::Content(code, Body::message(text))
    }
}

/// Handler failure, mapped to a response carrying `{"text": detail}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {detail}")]
pub struct HandlerError {
    pub code: Code,
    pub detail: String,
}

impl HandlerError {
    pub fn new(code: Code, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(Code::INTERNAL_SERVER_ERROR, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(Code::BAD_REQUEST, detail)
    }
}

pub type HandlerResult = Result<Reply, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_encoding() {
        assert_eq!(Body::message("OK").into_bytes(), br#"{"text":"OK"}"#.to_vec());
        assert_eq!(Body::from("hi").into_bytes(), b"hi".to_vec());
        assert_eq!(Body::Raw(vec![0, 1]).content_format(), None);
        assert_eq!(Body::Json(Value::Null).content_format(), Some(50));
    }

    #[test]
    fn test_handler_error_display() {
        let e = HandlerError::internal("disk full");
        assert_eq!(e.to_string(), "5.00: disk full");
    }
}
