//! Shared relay state: the socket, the session table and peer mesh behind a
//! single mutex, the traffic counters, and the router clock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::net::UdpSocket;

use crate::config::Config;
use crate::crypto;
use crate::ping::PingManager;
use crate::session::SessionMap;
use crate::stats::ThroughputStats;

/// Estimate of control-plane time, anchored when the init call succeeds.
#[derive(Debug, Clone, Copy)]
pub struct RouterClock {
    start: Instant,
    initialize_router_timestamp: u64,
}

impl RouterClock {
    pub fn new(initialize_router_timestamp: u64) -> Self {
        Self { start: Instant::now(), initialize_router_timestamp }
    }

    /// Whole seconds of control-plane time.
    pub fn router_time(&self) -> u64 {
        self.initialize_router_timestamp + self.start.elapsed().as_secs()
    }

    /// Monotonic seconds since initialization, for ping bookkeeping.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Everything guarded by the relay mutex. The session table and the peer
/// mesh share one lock because backend updates mutate both; critical
/// sections are an O(1) lookup plus a handful of field writes.
pub struct RelayState {
    pub sessions: SessionMap,
    pub ping_manager: PingManager,
}

pub struct Relay {
    pub socket: Arc<UdpSocket>,
    pub stats: ThroughputStats,
    pub relay_public_key: [u8; crypto::KEY_BYTES],
    pub relay_private_key: [u8; crypto::KEY_BYTES],
    pub router_public_key: [u8; crypto::KEY_BYTES],
    pub packet_hash_key: Option<[u8; crypto::KEY_BYTES]>,
    clock: RouterClock,
    state: Mutex<RelayState>,
}

impl Relay {
    pub fn new(socket: Arc<UdpSocket>, config: &Config, clock: RouterClock) -> Self {
        Self {
            socket,
            stats: ThroughputStats::new(),
            relay_public_key: config.relay_public_key,
            relay_private_key: config.relay_private_key,
            router_public_key: config.router_public_key,
            packet_hash_key: config.packet_hash_key,
            clock,
            state: Mutex::new(RelayState {
                sessions: SessionMap::new(),
                ping_manager: PingManager::new(),
            }),
        }
    }

    /// Lock the shared state. Never hold the guard across an await point, a
    /// crypto call, or a socket send.
    pub fn lock_state(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn router_time(&self) -> u64 {
        self.clock.router_time()
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }
}
