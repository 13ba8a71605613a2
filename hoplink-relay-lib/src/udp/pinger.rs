//! Relay-to-relay ping scheduler.
//!
//! Wakes at 100 Hz, collects the peers whose last ping has aged past the
//! ping interval under the state lock, then emits the 9-byte probes with the
//! lock released.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::protocol::{RELAY_PING_PACKET, RELAY_PING_PACKET_BYTES};
use crate::relay::Relay;
use crate::udp::send_packet;

const TICK: Duration = Duration::from_millis(10);

pub async fn run(relay: Arc<Relay>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = relay.elapsed();
                let due = relay.lock_state().ping_manager.due_pings(now);
                for ping in due {
                    let mut packet = [0u8; RELAY_PING_PACKET_BYTES];
                    packet[0] = RELAY_PING_PACKET;
                    packet[1..9].copy_from_slice(&ping.sequence.to_le_bytes());
                    send_packet(&relay, ping.address, &packet).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
