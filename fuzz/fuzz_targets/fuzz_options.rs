// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use rover_coap::option::{decode_uint, encode_uint, parse_query, BlockOption};

fuzz_target!(|data: &[u8]| {
    // Block1 value
    if let Some(value) = decode_uint(data) {
        assert_eq!(decode_uint(&encode_uint(value)), Some(value));
        let block = BlockOption::from_value(value);
        assert!(block.size() >= 16 && block.size() <= 2048);
    }

    // Uri-Query segments
    let text = String::from_utf8_lossy(data);
    let _ = parse_query(text.split('&'));
});
