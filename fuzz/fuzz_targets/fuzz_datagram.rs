// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use rover_coap::Message;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = Message::parse(data) else {
        return;
    };

    // Anything accepted must re-encode to an equivalent datagram
    let bytes = msg.to_bytes().expect("parsed message encodes");
    let again = Message::parse(&bytes).expect("encoded message parses");
    assert_eq!(msg, again);
});
