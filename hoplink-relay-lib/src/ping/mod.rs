//! Mesh of peer relays with a ping schedule and per-peer latency history.

pub mod history;
pub mod stats;

use crate::net::RelayAddress;
use history::PingHistory;
use stats::RouteStats;

pub const MAX_RELAYS: usize = 1024;
pub const PING_INTERVAL: f64 = 0.1;
pub const STATS_WINDOW: f64 = 10.0;
pub const PING_SAFETY: f64 = 1.0;

/// A peer relay as delivered by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerRelay {
    pub id: u64,
    pub address: RelayAddress,
}

/// Stats row reported to the backend for one peer.
#[derive(Debug, Clone, Copy)]
pub struct PeerStats {
    pub id: u64,
    pub rtt: f32,
    pub jitter: f32,
    pub packet_loss: f32,
}

/// An outbound ping due this tick.
#[derive(Debug, Clone, Copy)]
pub struct DuePing {
    pub sequence: u64,
    pub address: RelayAddress,
}

#[derive(Debug, Clone)]
struct RelayRecord {
    id: u64,
    address: RelayAddress,
    last_ping_time: f64,
    history_slot: usize,
}

/// Peer mesh state. The history pool is pre-allocated so a peer-list swap
/// only moves slot indices around: peers surviving the swap keep their ring
/// buffer, new peers get a cleared slot.
///
/// Invariants: no two records share a history slot, and the record count
/// never exceeds [`MAX_RELAYS`].
pub struct PingManager {
    records: Vec<RelayRecord>,
    pool: Vec<PingHistory>,
}

impl Default for PingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PingManager {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            pool: vec![PingHistory::new(); MAX_RELAYS],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Install a new peer list, preserving ping history across churn.
    ///
    /// Peers present in both the old and new lists carry their last-ping time
    /// and history slot forward (the address already on record wins). New
    /// peers get a cleared slot and a last-ping time staggered across one
    /// ping interval in the past, so the next scheduler tick spreads their
    /// first pings instead of bursting them.
    pub fn update(&mut self, peers: &[PeerRelay], now: f64) {
        let peers = &peers[..peers.len().min(MAX_RELAYS)];

        let mut slot_taken = [false; MAX_RELAYS];
        let mut matched = vec![false; peers.len()];
        let mut next: Vec<RelayRecord> = Vec::with_capacity(peers.len());

        for record in &self.records {
            if let Some(index) = peers
                .iter()
                .position(|peer| peer.id == record.id)
            {
                matched[index] = true;
                slot_taken[record.history_slot] = true;
                next.push(record.clone());
            }
        }

        let new_count = matched.iter().filter(|m| !**m).count();
        let mut new_index = 0usize;
        for (peer, found) in peers.iter().zip(matched.iter()) {
            if *found {
                continue;
            }
            let slot = slot_taken
                .iter()
                .position(|taken| !taken)
                .expect("pool has a slot for every record");
            slot_taken[slot] = true;
            self.pool[slot].clear();
            next.push(RelayRecord {
                id: peer.id,
                address: peer.address,
                last_ping_time: now - PING_INTERVAL
                    + new_index as f64 * PING_INTERVAL / new_count as f64,
                history_slot: slot,
            });
            new_index += 1;
        }

        self.records = next;

        debug_assert!(self.records.len() <= MAX_RELAYS);
        debug_assert!({
            let mut seen = [false; MAX_RELAYS];
            self.records.iter().all(|record| {
                let fresh = !seen[record.history_slot];
                seen[record.history_slot] = true;
                fresh
            })
        });
    }

    /// Match a pong to a peer by source address and record its arrival time.
    pub fn process_pong(&mut self, from: RelayAddress, sequence: u64, now: f64) -> bool {
        for record in &self.records {
            if record.address == from {
                self.pool[record.history_slot].pong_received(sequence, now);
                return true;
            }
        }
        false
    }

    /// Collect the peers whose last ping is older than the ping interval,
    /// recording a sent ping for each. The caller emits the datagrams after
    /// releasing the state lock.
    pub fn due_pings(&mut self, now: f64) -> Vec<DuePing> {
        let mut due = Vec::new();
        for record in &mut self.records {
            if record.last_ping_time + PING_INTERVAL <= now {
                let sequence = self.pool[record.history_slot].ping_sent(now);
                record.last_ping_time = now;
                due.push(DuePing { sequence, address: record.address });
            }
        }
        due
    }

    /// Per-peer stats over the trailing stats window.
    pub fn stats(&self, now: f64) -> Vec<PeerStats> {
        self.records
            .iter()
            .map(|record| {
                let route = RouteStats::from_history(
                    &self.pool[record.history_slot],
                    now - STATS_WINDOW,
                    now,
                    PING_SAFETY,
                );
                PeerStats {
                    id: record.id,
                    rtt: route.rtt,
                    jitter: route.jitter,
                    packet_loss: route.packet_loss,
                }
            })
            .collect()
    }

    #[cfg(test)]
    fn history_slot(&self, id: u64) -> Option<usize> {
        self.records.iter().find(|r| r.id == id).map(|r| r.history_slot)
    }

    #[cfg(test)]
    fn history(&self, id: u64) -> Option<&PingHistory> {
        self.history_slot(id).map(|slot| &self.pool[slot])
    }
}
