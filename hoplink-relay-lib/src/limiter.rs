//! Per-session bandwidth accounting.
//!
//! Bits are accumulated over a one-second interval and compared against the
//! session's kbps budget; a smoothed usage estimate is kept alongside for
//! reporting.

pub const BANDWIDTH_LIMITER_INTERVAL: f64 = 1.0;

/// Ethernet + IP + UDP framing plus the trailing CRC, in bits, for one
/// payload of `packet_bytes`.
pub fn wire_packet_bits(packet_bytes: usize) -> u32 {
    ((14 + 20 + 8 + packet_bytes + 4) * 8) as u32
}

#[derive(Debug, Clone)]
pub struct BandwidthLimiter {
    bits_sent: u64,
    last_check_time: f64,
    average_kbps: f64,
}

impl Default for BandwidthLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthLimiter {
    pub fn new() -> Self {
        Self { bits_sent: 0, last_check_time: -100.0, average_kbps: 0.0 }
    }

    pub fn reset(&mut self) {
        self.bits_sent = 0;
        self.last_check_time = -100.0;
        self.average_kbps = 0.0;
    }

    /// Account a packet against the budget. Returns true when the bits sent
    /// this interval exceed the allowance.
    pub fn add_packet(&mut self, current_time: f64, kbps_allowed: u32, packet_bits: u32) -> bool {
        let invalid = self.last_check_time < 0.0;
        if invalid
            || current_time - self.last_check_time >= BANDWIDTH_LIMITER_INTERVAL - 0.001
        {
            self.bits_sent = 0;
            self.last_check_time = current_time;
        }
        self.bits_sent += u64::from(packet_bits);
        self.bits_sent
            > (f64::from(kbps_allowed) * 1000.0 * BANDWIDTH_LIMITER_INTERVAL) as u64
    }

    fn add_sample(&mut self, kbps: f64) {
        if self.average_kbps == 0.0 && kbps != 0.0 {
            self.average_kbps = kbps;
            return;
        }
        if self.average_kbps != 0.0 && kbps == 0.0 {
            self.average_kbps = 0.0;
            return;
        }

        let delta = kbps - self.average_kbps;
        if delta < 0.000001 {
            self.average_kbps = kbps;
            return;
        }
        self.average_kbps += delta * 0.1;
    }

    /// Smoothed throughput estimate in kbps.
    pub fn usage_kbps(&mut self, current_time: f64) -> f64 {
        if self.last_check_time >= 0.0 {
            let delta_time = current_time - self.last_check_time;
            if delta_time > 0.1 {
                let kbps = self.bits_sent as f64 / delta_time / 1000.0;
                self.add_sample(kbps);
            }
        }
        self.average_kbps
    }
}
