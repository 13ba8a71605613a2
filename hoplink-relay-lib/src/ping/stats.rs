//! RTT, jitter and loss derived from a ping history window.

use super::history::{PingHistory, PING_HISTORY_ENTRY_COUNT};

/// No pongs in the window clamp the mean RTT to this many milliseconds.
const NO_PONG_RTT_MS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RouteStats {
    pub rtt: f32,
    pub jitter: f32,
    pub packet_loss: f32,
}

impl RouteStats {
    /// Derive stats over pings sent in `[start, end]`.
    ///
    /// Pings sent within the trailing `ping_safety` seconds are excluded from
    /// the loss denominator so in-flight pings are not flagged as lost.
    /// Jitter is three times the one-sided standard deviation of samples at
    /// or above the mean RTT.
    pub fn from_history(history: &PingHistory, start: f64, end: f64, ping_safety: f64) -> Self {
        debug_assert!(start < end);

        let mut stats = RouteStats::default();
        let entries = history.entries();

        let mut pings_sent = 0u32;
        let mut pongs_received = 0u32;
        for entry in entries.iter().take(PING_HISTORY_ENTRY_COUNT) {
            if entry.time_ping_sent >= start && entry.time_ping_sent <= end - ping_safety {
                pings_sent += 1;
                if entry.time_pong_received >= entry.time_ping_sent {
                    pongs_received += 1;
                }
            }
        }
        if pings_sent > 0 {
            stats.packet_loss =
                (100.0 * (1.0 - f64::from(pongs_received) / f64::from(pings_sent))) as f32;
        }

        let mut mean_rtt = 0.0;
        let mut pongs = 0u32;
        for entry in entries.iter().take(PING_HISTORY_ENTRY_COUNT) {
            if entry.time_ping_sent >= start
                && entry.time_ping_sent <= end
                && entry.time_pong_received > entry.time_ping_sent
            {
                mean_rtt += 1000.0 * (entry.time_pong_received - entry.time_ping_sent);
                pongs += 1;
            }
        }
        mean_rtt = if pongs > 0 { mean_rtt / f64::from(pongs) } else { NO_PONG_RTT_MS };
        stats.rtt = mean_rtt as f32;

        let mut jitter_samples = 0u32;
        let mut squared_deviation = 0.0;
        for entry in entries.iter().take(PING_HISTORY_ENTRY_COUNT) {
            if entry.time_ping_sent >= start
                && entry.time_ping_sent <= end
                && entry.time_pong_received > entry.time_ping_sent
            {
                let rtt = 1000.0 * (entry.time_pong_received - entry.time_ping_sent);
                if rtt >= mean_rtt {
                    let error = rtt - mean_rtt;
                    squared_deviation += error * error;
                    jitter_samples += 1;
                }
            }
        }
        if jitter_samples > 0 {
            stats.jitter = (3.0 * (squared_deviation / f64::from(jitter_samples)).sqrt()) as f32;
        }

        stats
    }
}
