// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Block1 (request body) reassembly.
//
// One partial transfer per (peer, token). Blocks must arrive in strict
// sequence starting at 0; anything else is rejected without touching the
// partial state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::option::BlockOption;

/// Why a block was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRejection {
    /// Non-zero block with no transfer in progress.
    MissingInitial { got: u32 },
    /// Gap or duplicate.
    OutOfOrder { expected: u32, got: u32 },
}

/// Result of feeding one block to the assembler.
#[derive(Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    /// More blocks expected; acknowledge with 2.31 Continue.
    Continue,
    /// Final block received; the whole body.
    Complete(Vec<u8>),
    /// Refused; answer 4.08 Request Entity Incomplete.
    Rejected(BlockRejection),
}

#[derive(Debug)]
struct Partial {
    buf: Vec<u8>,
    next_num: u32,
    touched: Instant,
}

/// Per-(peer, token) reassembly table.
#[derive(Debug, Default)]
pub struct BlockAssembler {
    partials: HashMap<(SocketAddr, Vec<u8>), Partial>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one block.
    pub fn accept(
        &mut self,
        peer: SocketAddr,
        token: &[u8],
        block: BlockOption,
        payload: &[u8],
        now: Instant,
    ) -> BlockOutcome {
        let key = (peer, token.to_vec());

        if block.num != 0 && !self.partials.contains_key(&key) {
            return BlockOutcome::Rejected(BlockRejection::MissingInitial { got: block.num });
        }
        let partial = self.partials.entry(key.clone()).or_insert_with(|| Partial {
            buf: Vec::new(),
            next_num: 0,
            touched: now,
        });

        if block.num != partial.next_num {
            return BlockOutcome::Rejected(BlockRejection::OutOfOrder {
                expected: partial.next_num,
                got: block.num,
            });
        }

        partial.buf.extend_from_slice(payload);
        partial.next_num += 1;
        partial.touched = now;

        if block.more {
            return BlockOutcome::Continue;
        }
        match self.partials.remove(&key) {
            Some(done) => BlockOutcome::Complete(done.buf),
            None => BlockOutcome::Complete(Vec::new()),
        }
    }

    /// Drop transfers idle for longer than `idle`. Returns how many.
    pub fn sweep(&mut self, now: Instant, idle: Duration) -> usize {
        let before = self.partials.len();
        self.partials
            .retain(|_, p| now.saturating_duration_since(p.touched) <= idle);
        before - self.partials.len()
    }

    /// Transfers in progress.
    pub fn len(&self) -> usize {
        self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }
}
