// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Datagram wire format parser/builder.
//
// Layout (network byte order):
//
//   0                   1                   2                   3
//   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |Ver| T |  TKL  |      Code     |          Message ID           |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |   Token (TKL bytes) ...
//  |   Options (delta/length coded) ...
//  |1 1 1 1 1 1 1 1|    Payload ...
//
// All parsing is safe: malformed input returns Err, never panics.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::CoapError;
use crate::option::{self, BlockOption, CoapOption};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Protocol version carried in every header.
pub const VERSION: u8 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Longest token allowed.
pub const MAX_TOKEN_LEN: usize = 8;

/// Separates options from payload.
pub const PAYLOAD_MARKER: u8 = 0xFF;

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 5683;

const EXT_BYTE: u8 = 13;
const EXT_WORD: u8 = 14;
const EXT_BYTE_BASE: usize = 13;
const EXT_WORD_BASE: usize = 269;
const MAX_EXT: usize = EXT_WORD_BASE + 0xFFFF;

// ---------------------------------------------------------------------------
// Message type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Self {
        match v & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::Confirmable => "CON",
            Self::NonConfirmable => "NON",
            Self::Acknowledgement => "ACK",
            Self::Reset => "RST",
        }
    }
}

// ---------------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------------

/// Request method or response status, `class << 5 | detail`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code(0);

    pub const GET: Code = Code(1);
    pub const POST: Code = Code(2);
    pub const PUT: Code = Code(3);
    pub const DELETE: Code = Code(4);

    pub const CHANGED: Code = Code::new(2, 4);
    pub const CONTENT: Code = Code::new(2, 5);
    pub const CONTINUE: Code = Code::new(2, 31);
    pub const BAD_REQUEST: Code = Code::new(4, 0);
    pub const NOT_FOUND: Code = Code::new(4, 4);
    pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);
    pub const REQUEST_ENTITY_INCOMPLETE: Code = Code::new(4, 8);
    pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
    pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);

    pub const fn new(class: u8, detail: u8) -> Self {
        Code((class << 5) | (detail & 0x1F))
    }

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }

    pub fn is_error(self) -> bool {
        self.class() >= 4
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Method::from_code(*self) {
            Some(m) => f.write_str(m.as_str()),
            None => write!(f, "{}.{:02}", self.class(), self.detail()),
        }
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({})", self)
    }
}

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn from_code(code: Code) -> Option<Self> {
        match code {
            Code::GET => Some(Self::Get),
            Code::POST => Some(Self::Post),
            Code::PUT => Some(Self::Put),
            Code::DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn code(self) -> Code {
        match self {
            Self::Get => Code::GET,
            Self::Post => Code::POST,
            Self::Put => Code::PUT,
            Self::Delete => Code::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Status used when a handler returns a body without a code.
    pub fn default_success(self) -> Code {
        match self {
            Self::Get => Code::CONTENT,
            _ => Code::CHANGED,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub mtype: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Options in wire order (ascending number, repeats kept in sequence).
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(mtype: MessageType, code: Code, message_id: u16, token: impl Into<Vec<u8>>) -> Self {
        Self {
            mtype,
            code,
            message_id,
            token: token.into(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_option(mut self, option: CoapOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn is_confirmable(&self) -> bool {
        self.mtype == MessageType::Confirmable
    }

    /// First option with `number`.
    pub fn option(&self, number: u16) -> Option<&CoapOption> {
        self.options.iter().find(|o| o.number == number)
    }

    /// Every option with `number`, in order.
    pub fn options_of(&self, number: u16) -> impl Iterator<Item = &CoapOption> {
        self.options.iter().filter(move |o| o.number == number)
    }

    /// Uri-Path segments joined into `/a/b`; `/` when absent.
    pub fn uri_path(&self) -> String {
        let segments: Vec<&str> = self
            .options_of(option::URI_PATH)
            .filter_map(CoapOption::as_str)
            .collect();
        format!("/{}", segments.join("/"))
    }

    pub fn uri_query(&self) -> Map<String, Value> {
        option::parse_query(self.options_of(option::URI_QUERY).filter_map(CoapOption::as_str))
    }

    pub fn observe(&self) -> Option<u32> {
        self.option(option::OBSERVE).and_then(CoapOption::as_uint)
    }

    pub fn block1(&self) -> Option<BlockOption> {
        self.option(option::BLOCK1)
            .and_then(CoapOption::as_uint)
            .map(BlockOption::from_value)
    }

    pub fn content_format(&self) -> Option<u32> {
        self.option(option::CONTENT_FORMAT).and_then(CoapOption::as_uint)
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    /// Parse a datagram.
    pub fn parse(buf: &[u8]) -> Result<Self, CoapError> {
        if buf.len() < HEADER_SIZE {
            return Err(CoapError::Truncated);
        }

        let version = buf[0] >> 6;
        if version != VERSION {
            return Err(CoapError::BadVersion(version));
        }
        let mtype = MessageType::from_u8(buf[0] >> 4);
        let token_len = usize::from(buf[0] & 0x0F);
        if token_len > MAX_TOKEN_LEN {
            return Err(CoapError::InvalidTokenLength(token_len));
        }
        let code = Code(buf[1]);
        let message_id = u16::from_be_bytes([buf[2], buf[3]]);

        let mut pos = HEADER_SIZE;
        let token = buf
            .get(pos..pos + token_len)
            .ok_or(CoapError::Truncated)?
            .to_vec();
        pos += token_len;

        let mut options = Vec::new();
        let mut number: u32 = 0;
        let mut payload = Vec::new();

        while pos < buf.len() {
            let head = buf[pos];
            pos += 1;
            if head == PAYLOAD_MARKER {
                payload = buf[pos..].to_vec();
                break;
            }

            let delta = read_extended(head >> 4, buf, &mut pos)?;
            let length = read_extended(head & 0x0F, buf, &mut pos)?;

            number += delta as u32;
            let option_number = u16::try_from(number).map_err(|_| CoapError::OptionOverflow)?;

            let value = buf.get(pos..pos + length).ok_or(CoapError::Truncated)?;
            pos += length;
            options.push(CoapOption::new(option_number, value));
        }

        Ok(Self {
            mtype,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Serialize into `buf`.
    ///
    /// Options are written in ascending number order; options sharing a
    /// number keep their relative order.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), CoapError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(CoapError::InvalidTokenLength(self.token.len()));
        }

        buf.push((VERSION << 6) | (self.mtype.as_u8() << 4) | self.token.len() as u8);
        buf.push(self.code.0);
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.token);

        let mut sorted: Vec<&CoapOption> = self.options.iter().collect();
        sorted.sort_by_key(|o| o.number);

        let mut last = 0u16;
        for opt in sorted {
            let (delta_nibble, delta_ext) = split_extended(usize::from(opt.number - last))?;
            let (len_nibble, len_ext) = split_extended(opt.value.len())
                .map_err(|_| CoapError::OptionTooLong(opt.value.len()))?;
            buf.push((delta_nibble << 4) | len_nibble);
            buf.extend_from_slice(&delta_ext);
            buf.extend_from_slice(&len_ext);
            buf.extend_from_slice(&opt.value);
            last = opt.number;
        }

        if !self.payload.is_empty() {
            buf.push(PAYLOAD_MARKER);
            buf.extend_from_slice(&self.payload);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CoapError> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.token.len() + self.payload.len() + 16);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// Decode a 4-bit delta/length field plus its extension bytes.
fn read_extended(nibble: u8, buf: &[u8], pos: &mut usize) -> Result<usize, CoapError> {
    match nibble {
        0..=12 => Ok(usize::from(nibble)),
        EXT_BYTE => {
            let b = *buf.get(*pos).ok_or(CoapError::Truncated)?;
            *pos += 1;
            Ok(usize::from(b) + EXT_BYTE_BASE)
        }
        EXT_WORD => {
            let w = buf.get(*pos..*pos + 2).ok_or(CoapError::Truncated)?;
            *pos += 2;
            Ok(usize::from(u16::from_be_bytes([w[0], w[1]])) + EXT_WORD_BASE)
        }
        _ => Err(CoapError::ReservedNibble),
    }
}

/// Split a delta/length into its nibble and extension bytes.
fn split_extended(value: usize) -> Result<(u8, Vec<u8>), CoapError> {
    if value < EXT_BYTE_BASE {
        Ok((value as u8, Vec::new()))
    } else if value < EXT_WORD_BASE {
        Ok((EXT_BYTE, vec![(value - EXT_BYTE_BASE) as u8]))
    } else if value <= MAX_EXT {
        Ok((EXT_WORD, ((value - EXT_WORD_BASE) as u16).to_be_bytes().to_vec()))
    } else {
        Err(CoapError::OptionOverflow)
    }
}
