// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Option numbers, unsigned option values and the Block1 descriptor.

use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Option numbers
// ---------------------------------------------------------------------------

pub const OBSERVE: u16 = 6;
pub const URI_PATH: u16 = 11;
pub const CONTENT_FORMAT: u16 = 12;
pub const URI_QUERY: u16 = 15;
pub const BLOCK1: u16 = 27;

/// Content-Format for `text/plain; charset=utf-8`.
pub const FORMAT_TEXT: u32 = 0;
/// Content-Format for `application/json`.
pub const FORMAT_JSON: u32 = 50;

/// Observe values carried by a request.
pub const OBSERVE_REGISTER: u32 = 0;
pub const OBSERVE_DEREGISTER: u32 = 1;

// ---------------------------------------------------------------------------
// Option
// ---------------------------------------------------------------------------

/// A single decoded option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

impl CoapOption {
    pub fn new(number: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            value: value.into(),
        }
    }

    /// Option carrying a minimally encoded unsigned integer.
    pub fn uint(number: u16, value: u32) -> Self {
        Self::new(number, encode_uint(value))
    }

    pub fn as_uint(&self) -> Option<u32> {
        decode_uint(&self.value)
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Big-endian unsigned integer without leading zero bytes (0 encodes empty).
pub fn encode_uint(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

/// Inverse of [`encode_uint`]; `None` for values wider than 4 bytes.
pub fn decode_uint(bytes: &[u8]) -> Option<u32> {
    if bytes.len() > 4 {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

// ---------------------------------------------------------------------------
// Block1
// ---------------------------------------------------------------------------

/// Block-wise transfer descriptor: `num << 4 | more << 3 | szx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOption {
    pub num: u32,
    pub more: bool,
    pub szx: u8,
}

impl BlockOption {
    pub fn new(num: u32, more: bool, szx: u8) -> Self {
        Self {
            num,
            more,
            szx: szx & 0x07,
        }
    }

    pub fn from_value(value: u32) -> Self {
        Self {
            num: value >> 4,
            more: (value >> 3) & 1 == 1,
            szx: (value & 0x07) as u8,
        }
    }

    pub fn to_value(self) -> u32 {
        (self.num << 4) | (u32::from(self.more) << 3) | u32::from(self.szx)
    }

    /// Block size in bytes, `2^(szx + 4)`.
    pub fn size(self) -> usize {
        1usize << (u32::from(self.szx) + 4)
    }

    pub fn to_option(self) -> CoapOption {
        CoapOption::uint(BLOCK1, self.to_value())
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Parse Uri-Query segments into a JSON object.
///
/// `k=v` maps to a string, or to an integer when `v` is all digits; a bare
/// `k` maps to `true`.
pub fn parse_query<'a, I>(segments: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut query = Map::new();
    for segment in segments {
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, raw)) => {
                let value = if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
                    raw.parse::<u64>()
                        .map(Value::from)
                        .unwrap_or_else(|_| Value::from(raw))
                } else {
                    Value::from(raw)
                };
                query.insert(key.to_string(), value);
            }
            None => {
                query.insert(segment.to_string(), Value::Bool(true));
            }
        }
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uint_minimal_encoding() {
        assert!(encode_uint(0).is_empty());
        assert_eq!(encode_uint(50), vec![50]);
        assert_eq!(encode_uint(0x1234), vec![0x12, 0x34]);
        assert_eq!(decode_uint(&[0x01, 0x00, 0x00]), Some(0x10000));
        assert_eq!(decode_uint(&[]), Some(0));
        assert_eq!(decode_uint(&[1, 2, 3, 4, 5]), None);
    }

    #[test]
    fn test_block_fields() {
        // num=2, more, szx=6 (1024 bytes)
        let b = BlockOption::from_value(0x2E);
        assert_eq!(b, BlockOption::new(2, true, 6));
        assert_eq!(b.size(), 1024);
        assert_eq!(b.to_value(), 0x2E);

        let last = BlockOption::from_value(0x12);
        assert_eq!((last.num, last.more, last.szx), (1, false, 2));
    }

    #[test]
    fn test_block_option_wide_num() {
        let b = BlockOption::new(300, false, 2);
        let opt = b.to_option();
        assert_eq!(opt.value.len(), 2);
        assert_eq!(BlockOption::from_value(opt.as_uint().unwrap()), b);
    }

    #[test]
    fn test_parse_query() {
        let q = parse_query(["speed=42", "mode=fast", "verbose", "empty="]);
        assert_eq!(q.get("speed"), Some(&json!(42)));
        assert_eq!(q.get("mode"), Some(&json!("fast")));
        assert_eq!(q.get("verbose"), Some(&json!(true)));
        assert_eq!(q.get("empty"), Some(&json!("")));
    }
}
