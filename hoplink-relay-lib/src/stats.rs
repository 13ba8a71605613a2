//! Lock-free traffic counters.
//!
//! The data plane only ever performs relaxed atomic adds; the backend task
//! swaps every counter to zero once per update and logs the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    RelayPing,
    RelayPong,
    RouteRequest,
    RouteResponse,
    ContinueRequest,
    ContinueResponse,
    ClientToServer,
    ServerToClient,
    SessionPing,
    SessionPong,
    NearPing,
    Unknown,
    ZeroLength,
}

pub const PACKET_CLASS_COUNT: usize = 13;

const PACKET_CLASS_NAMES: [&str; PACKET_CLASS_COUNT] = [
    "relay_ping",
    "relay_pong",
    "route_request",
    "route_response",
    "continue_request",
    "continue_response",
    "client_to_server",
    "server_to_client",
    "session_ping",
    "session_pong",
    "near_ping",
    "unknown",
    "zero_length",
];

#[derive(Default)]
pub struct ThroughputStats {
    packets: [AtomicU64; PACKET_CLASS_COUNT],
    bytes: [AtomicU64; PACKET_CLASS_COUNT],
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// One class's packet and byte totals since the last snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ClassCount {
    pub packets: u64,
    pub bytes: u64,
}

/// Counter values drained by [`ThroughputStats::snapshot_and_reset`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThroughputSnapshot {
    pub classes: Vec<(String, ClassCount)>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ThroughputStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one classified datagram of `bytes` length against `class`.
    pub fn add(&self, class: PacketClass, bytes: usize) {
        let index = class as usize;
        self.packets[index].fetch_add(1, Ordering::Relaxed);
        self.bytes[index].fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one sent datagram toward the whole-relay total.
    pub fn add_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one received datagram toward the whole-relay total.
    pub fn add_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Drain every counter to zero, returning what accumulated since the
    /// previous call.
    pub fn snapshot_and_reset(&self) -> ThroughputSnapshot {
        let mut snapshot = ThroughputSnapshot {
            classes: Vec::with_capacity(PACKET_CLASS_COUNT),
            bytes_sent: self.bytes_sent.swap(0, Ordering::Relaxed),
            bytes_received: self.bytes_received.swap(0, Ordering::Relaxed),
        };
        for index in 0..PACKET_CLASS_COUNT {
            snapshot.classes.push((
                PACKET_CLASS_NAMES[index].to_string(),
                ClassCount {
                    packets: self.packets[index].swap(0, Ordering::Relaxed),
                    bytes: self.bytes[index].swap(0, Ordering::Relaxed),
                },
            ));
        }
        snapshot
    }
}

impl ThroughputSnapshot {
    pub fn class(&self, class: PacketClass) -> ClassCount {
        self.classes[class as usize].1
    }
}
