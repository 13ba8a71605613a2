//! Ring buffer of ping send/receive times for one peer relay.

pub const PING_HISTORY_ENTRY_COUNT: usize = 256;

const INVALID_SEQUENCE: u64 = u64::MAX;

#[derive(Debug, Clone, Copy)]
pub struct PingHistoryEntry {
    pub sequence: u64,
    pub time_ping_sent: f64,
    pub time_pong_received: f64,
}

impl PingHistoryEntry {
    const EMPTY: PingHistoryEntry = PingHistoryEntry {
        sequence: INVALID_SEQUENCE,
        time_ping_sent: -1.0,
        time_pong_received: -1.0,
    };
}

#[derive(Debug, Clone)]
pub struct PingHistory {
    sequence: u64,
    entries: [PingHistoryEntry; PING_HISTORY_ENTRY_COUNT],
}

impl Default for PingHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PingHistory {
    pub fn new() -> Self {
        Self { sequence: 0, entries: [PingHistoryEntry::EMPTY; PING_HISTORY_ENTRY_COUNT] }
    }

    pub fn clear(&mut self) {
        self.sequence = 0;
        self.entries = [PingHistoryEntry::EMPTY; PING_HISTORY_ENTRY_COUNT];
    }

    pub fn entries(&self) -> &[PingHistoryEntry; PING_HISTORY_ENTRY_COUNT] {
        &self.entries
    }

    /// Record an outgoing ping, returning its sequence number.
    pub fn ping_sent(&mut self, time: f64) -> u64 {
        let index = (self.sequence % PING_HISTORY_ENTRY_COUNT as u64) as usize;
        let entry = &mut self.entries[index];
        entry.sequence = self.sequence;
        entry.time_ping_sent = time;
        entry.time_pong_received = -1.0;
        self.sequence += 1;
        entry.sequence
    }

    /// Record a pong arrival. Ignored unless the slot still holds the same
    /// sequence (late pongs for overwritten slots are dropped).
    pub fn pong_received(&mut self, sequence: u64, time: f64) {
        let index = (sequence % PING_HISTORY_ENTRY_COUNT as u64) as usize;
        let entry = &mut self.entries[index];
        if entry.sequence == sequence {
            entry.time_pong_received = time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_increment_from_zero() {
        let mut history = PingHistory::new();
        assert_eq!(history.ping_sent(1.0), 0);
        assert_eq!(history.ping_sent(1.1), 1);
        assert_eq!(history.ping_sent(1.2), 2);
    }

    #[test]
    fn pong_matches_its_slot() {
        let mut history = PingHistory::new();
        let sequence = history.ping_sent(5.0);
        history.pong_received(sequence, 5.05);

        let entry = history.entries()[sequence as usize];
        assert_eq!(entry.time_ping_sent, 5.0);
        assert_eq!(entry.time_pong_received, 5.05);
    }

    #[test]
    fn stale_pong_for_overwritten_slot_is_ignored() {
        let mut history = PingHistory::new();
        let first = history.ping_sent(1.0);
        for i in 0..PING_HISTORY_ENTRY_COUNT as u64 {
            history.ping_sent(2.0 + i as f64);
        }
        // slot 0 now belongs to a newer sequence
        history.pong_received(first, 9.0);
        let entry = history.entries()[0];
        assert_ne!(entry.sequence, first);
        assert_eq!(entry.time_pong_received, -1.0);
    }

    #[test]
    fn clear_resets_every_slot() {
        let mut history = PingHistory::new();
        history.ping_sent(1.0);
        history.clear();
        assert_eq!(history.ping_sent(2.0), 0);
        for entry in history.entries().iter().skip(1) {
            assert_eq!(entry.sequence, u64::MAX);
        }
    }
}
