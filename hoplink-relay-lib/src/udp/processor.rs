//! The per-packet state machine.
//!
//! Every inbound datagram is classified by its leading type byte and either
//! reflected, forwarded, or dropped. The forwarding path is drop-on-any-
//! doubt: a size mismatch, failed decrypt, unknown or expired session, replay
//! hit or stale sequence ends the packet's life with nothing sent back.
//!
//! The state lock is held only for the table lookup and in-place field
//! mutation; key material and forwarding addresses are copied out before any
//! crypto or socket work.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::crypto;
use crate::net::RelayAddress;
use crate::protocol::{
    self, clean_sequence, peek_header, verify_header, Direction, CLIENT_TO_SERVER_PACKET,
    CONTINUE_REQUEST_PACKET, CONTINUE_RESPONSE_PACKET, HEADER_BYTES, MAX_PACKET_BYTES, MTU,
    NEAR_PING_PACKET, NEAR_PONG_PACKET, RELAY_PING_PACKET, RELAY_PONG_PACKET,
    ROUTE_REQUEST_PACKET, ROUTE_RESPONSE_PACKET, SERVER_TO_CLIENT_PACKET, SESSION_PING_PACKET,
    SESSION_PONG_PACKET,
};
use crate::relay::Relay;
use crate::session::{session_key, Session};
use crate::stats::PacketClass;
use crate::token::{
    ContinueToken, RouteToken, ENCRYPTED_CONTINUE_TOKEN_BYTES, ENCRYPTED_ROUTE_TOKEN_BYTES,
};
use crate::udp::send_packet;

/// Session ping/pong packets may carry up to this much payload past the
/// header.
const SESSION_PROBE_EXTRA_BYTES: usize = 32;

pub struct PacketProcessor {
    relay: Arc<Relay>,
}

impl PacketProcessor {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Receive loop. Exits when the shutdown channel flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buffer = [0u8; MAX_PACKET_BYTES];
        loop {
            tokio::select! {
                result = self.relay.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((length, from)) => {
                            self.relay.stats.add_received(length);
                            self.process(&mut buffer[..length], from).await;
                        }
                        Err(err) => warn!(error = %err, "socket receive failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Validate framing and dispatch one datagram.
    pub async fn process(&self, datagram: &mut [u8], from: SocketAddr) {
        if datagram.is_empty() {
            self.relay.stats.add(PacketClass::ZeroLength, 0);
            return;
        }

        let from = RelayAddress::from(from);

        let packet: &mut [u8] = match self.relay.packet_hash_key {
            Some(key) => {
                if datagram.len() <= crypto::PACKET_HASH_BYTES {
                    self.relay.stats.add(PacketClass::Unknown, datagram.len());
                    return;
                }
                let (prefix, inner) = datagram.split_at_mut(crypto::PACKET_HASH_BYTES);
                if crypto::packet_hash(&key, inner) != prefix[..] {
                    self.relay.stats.add(PacketClass::Unknown, inner.len());
                    return;
                }
                inner
            }
            None => datagram,
        };

        match (packet[0], packet.len()) {
            (RELAY_PING_PACKET, protocol::RELAY_PING_PACKET_BYTES) => {
                self.handle_relay_ping(packet, from).await;
            }
            (RELAY_PONG_PACKET, protocol::RELAY_PING_PACKET_BYTES) => {
                self.handle_relay_pong(packet, from);
            }
            (ROUTE_REQUEST_PACKET, _) => self.handle_route_request(packet, from).await,
            (ROUTE_RESPONSE_PACKET, _) => {
                self.forward_response(packet, PacketClass::RouteResponse).await;
            }
            (CONTINUE_REQUEST_PACKET, _) => self.handle_continue_request(packet).await,
            (CONTINUE_RESPONSE_PACKET, _) => {
                self.forward_response(packet, PacketClass::ContinueResponse).await;
            }
            (CLIENT_TO_SERVER_PACKET, _) => {
                self.forward_payload(packet, Direction::ClientToServer, PacketClass::ClientToServer)
                    .await;
            }
            (SERVER_TO_CLIENT_PACKET, _) => {
                self.forward_payload(packet, Direction::ServerToClient, PacketClass::ServerToClient)
                    .await;
            }
            (SESSION_PING_PACKET, _) => {
                self.forward_probe(packet, Direction::ClientToServer, PacketClass::SessionPing)
                    .await;
            }
            (SESSION_PONG_PACKET, _) => {
                self.forward_probe(packet, Direction::ServerToClient, PacketClass::SessionPong)
                    .await;
            }
            (NEAR_PING_PACKET, _) => self.handle_near_ping(packet, from).await,
            (packet_type, length) => {
                debug!(packet_type, length, "received unknown packet");
                self.relay.stats.add(PacketClass::Unknown, length);
            }
        }
    }

    /// Turn the probe around: same 9 bytes, pong type, back to the sender.
    /// No authentication; a forged ping can only skew the sender's own stats.
    async fn handle_relay_ping(&self, packet: &mut [u8], from: RelayAddress) {
        self.relay.stats.add(PacketClass::RelayPing, packet.len());
        packet[0] = RELAY_PONG_PACKET;
        send_packet(&self.relay, from, packet).await;
    }

    fn handle_relay_pong(&self, packet: &[u8], from: RelayAddress) {
        self.relay.stats.add(PacketClass::RelayPong, packet.len());
        let sequence = u64::from_le_bytes(packet[1..9].try_into().expect("fixed width"));
        let now = self.relay.elapsed();
        self.relay
            .lock_state()
            .ping_manager
            .process_pong(from, sequence, now);
    }

    async fn handle_route_request(&self, packet: &mut [u8], from: RelayAddress) {
        self.relay.stats.add(PacketClass::RouteRequest, packet.len());

        if packet.len() < 1 + ENCRYPTED_ROUTE_TOKEN_BYTES * 2 {
            debug!(length = packet.len(), "ignoring route request, bad packet size");
            return;
        }

        let token = match RouteToken::read_encrypted(
            &packet[1..],
            &self.relay.router_public_key,
            &self.relay.relay_private_key,
        ) {
            Ok(token) => token,
            Err(_) => {
                debug!("ignoring route request, could not read route token");
                return;
            }
        };

        if token.expire_timestamp < self.relay.router_time() {
            return;
        }

        let created = {
            let mut state = self.relay.lock_state();
            state
                .sessions
                .insert_if_absent(Session::from_route_token(&token, from))
        };
        if created {
            info!("session created: {:x}.{}", token.session_id, token.session_version);
        }

        // strip our token and pass the rest of the chain along
        packet[ENCRYPTED_ROUTE_TOKEN_BYTES] = ROUTE_REQUEST_PACKET;
        send_packet(
            &self.relay,
            token.next_address,
            &packet[ENCRYPTED_ROUTE_TOKEN_BYTES..],
        )
        .await;
    }

    async fn handle_continue_request(&self, packet: &mut [u8]) {
        self.relay.stats.add(PacketClass::ContinueRequest, packet.len());

        if packet.len() < 1 + ENCRYPTED_CONTINUE_TOKEN_BYTES * 2 {
            debug!(length = packet.len(), "ignoring continue request, bad packet size");
            return;
        }

        let token = match ContinueToken::read_encrypted(
            &packet[1..],
            &self.relay.router_public_key,
            &self.relay.relay_private_key,
        ) {
            Ok(token) => token,
            Err(_) => {
                debug!("ignoring continue request, could not read continue token");
                return;
            }
        };

        let router_time = self.relay.router_time();
        if token.expire_timestamp < router_time {
            return;
        }

        let (next_address, extended) = {
            let mut state = self.relay.lock_state();
            let Some(session) = state
                .sessions
                .get_mut(session_key(token.session_id, token.session_version))
            else {
                return;
            };
            if session.expired(router_time) {
                return;
            }
            // expiry only ever moves forward
            let extended = token.expire_timestamp > session.expire_timestamp;
            if extended {
                session.expire_timestamp = token.expire_timestamp;
            }
            (session.next_address, extended)
        };
        if extended {
            info!("session continued: {:x}.{}", token.session_id, token.session_version);
        }

        packet[ENCRYPTED_CONTINUE_TOKEN_BYTES] = CONTINUE_REQUEST_PACKET;
        send_packet(
            &self.relay,
            next_address,
            &packet[ENCRYPTED_CONTINUE_TOKEN_BYTES..],
        )
        .await;
    }

    /// Route and continue responses: exactly one header, server to client,
    /// strictly advancing sequence.
    async fn forward_response(&self, packet: &mut [u8], class: PacketClass) {
        self.relay.stats.add(class, packet.len());

        if packet.len() != HEADER_BYTES {
            return;
        }
        let Ok(header) = peek_header(Direction::ServerToClient, packet) else {
            return;
        };

        let router_time = self.relay.router_time();
        let sequence = clean_sequence(header.sequence);
        let (private_key, prev_address) = {
            let mut state = self.relay.lock_state();
            let Some(session) = state
                .sessions
                .get_mut(session_key(header.session_id, header.session_version))
            else {
                return;
            };
            if session.expired(router_time) {
                return;
            }
            if sequence <= session.server_to_client_sequence {
                return;
            }
            // the high-water mark advances before the tag is checked
            session.server_to_client_sequence = sequence;
            (session.private_key, session.prev_address)
        };

        if verify_header(Direction::ServerToClient, &private_key, packet).is_err() {
            return;
        }
        send_packet(&self.relay, prev_address, packet).await;
    }

    /// Tunnelled game payload in either direction, replay-window protected.
    async fn forward_payload(&self, packet: &mut [u8], direction: Direction, class: PacketClass) {
        self.relay.stats.add(class, packet.len());

        if packet.len() <= HEADER_BYTES || packet.len() > HEADER_BYTES + MTU {
            return;
        }
        let Ok(header) = peek_header(direction, packet) else {
            return;
        };

        let router_time = self.relay.router_time();
        let sequence = clean_sequence(header.sequence);
        let (private_key, target) = {
            let mut state = self.relay.lock_state();
            let Some(session) = state
                .sessions
                .get_mut(session_key(header.session_id, header.session_version))
            else {
                return;
            };
            if session.expired(router_time) {
                return;
            }
            let replay = match direction {
                Direction::ClientToServer => &mut session.replay_client_to_server,
                Direction::ServerToClient => &mut session.replay_server_to_client,
            };
            if replay.already_received(sequence) {
                return;
            }
            replay.advance(sequence);
            let target = match direction {
                Direction::ClientToServer => session.next_address,
                Direction::ServerToClient => session.prev_address,
            };
            (session.private_key, target)
        };

        if verify_header(direction, &private_key, packet).is_err() {
            return;
        }
        send_packet(&self.relay, target, packet).await;
    }

    /// Session pings and pongs are rare and monotonically advancing, so a
    /// high-water comparison stands in for the replay window.
    async fn forward_probe(&self, packet: &mut [u8], direction: Direction, class: PacketClass) {
        self.relay.stats.add(class, packet.len());

        if packet.len() > HEADER_BYTES + SESSION_PROBE_EXTRA_BYTES {
            return;
        }
        let Ok(header) = peek_header(direction, packet) else {
            return;
        };

        let router_time = self.relay.router_time();
        let sequence = clean_sequence(header.sequence);
        let (private_key, target) = {
            let mut state = self.relay.lock_state();
            let Some(session) = state
                .sessions
                .get_mut(session_key(header.session_id, header.session_version))
            else {
                return;
            };
            if session.expired(router_time) {
                return;
            }
            let high_water = match direction {
                Direction::ClientToServer => &mut session.client_to_server_sequence,
                Direction::ServerToClient => &mut session.server_to_client_sequence,
            };
            if sequence <= *high_water {
                return;
            }
            *high_water = sequence;
            let target = match direction {
                Direction::ClientToServer => session.next_address,
                Direction::ServerToClient => session.prev_address,
            };
            (session.private_key, target)
        };

        if verify_header(direction, &private_key, packet).is_err() {
            return;
        }
        send_packet(&self.relay, target, packet).await;
    }

    async fn handle_near_ping(&self, packet: &mut [u8], from: RelayAddress) {
        self.relay.stats.add(PacketClass::NearPing, packet.len());

        if packet.len() != protocol::NEAR_PING_PACKET_BYTES {
            return;
        }
        packet[0] = NEAR_PONG_PACKET;
        send_packet(
            &self.relay,
            from,
            &packet[..protocol::NEAR_PONG_PACKET_BYTES],
        )
        .await;
    }
}
