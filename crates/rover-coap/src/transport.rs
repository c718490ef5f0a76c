// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// UDP transport shared by the receive loop, handlers and the client role.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};

use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::CoapError;
use crate::message::Message;

/// Bound UDP socket plus the outbound message id sequence.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    next_message_id: AtomicU16,
}

impl UdpTransport {
    /// Bind `addr` using `socket2`, then hand the socket to tokio.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr, broadcast: bool) -> Result<Self, CoapError> {
        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        if broadcast {
            socket.set_broadcast(true)?;
        }
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        Ok(Self {
            socket,
            next_message_id: AtomicU16::new(initial_message_id()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CoapError> {
        Ok(self.socket.local_addr()?)
    }

    /// Next outbound message id (wraps at 65535).
    pub fn next_message_id(&self) -> u16 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    /// Encode and send one message.
    pub async fn send(&self, peer: SocketAddr, msg: &Message) -> Result<(), CoapError> {
        let bytes = msg.to_bytes()?;
        self.socket.send_to(&bytes, peer).await?;
        trace!(
            %peer,
            kind = msg.mtype.short_name(),
            code = %msg.code,
            mid = msg.message_id,
            len = bytes.len(),
            "tx"
        );
        Ok(())
    }
}

/// Seed for the message id sequence (clock ^ pid).
fn initial_message_id() -> u16 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos ^ std::process::id()) as u16
}
