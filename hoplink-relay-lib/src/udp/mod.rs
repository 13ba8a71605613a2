//! UDP socket setup and the data-plane tasks that share it.

pub mod pinger;
pub mod processor;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::crypto;
use crate::error::{RelayError, Result};
use crate::net::RelayAddress;
use crate::protocol::MAX_PACKET_BYTES;
use crate::relay::Relay;

pub use processor::PacketProcessor;

const SOCKET_BUFFER_BYTES: usize = 100 * 1024;

/// Bind the relay socket with enlarged kernel buffers and hand it to tokio.
pub fn bind_socket(address: &RelayAddress) -> Result<UdpSocket> {
    let socket_addr = address
        .to_socket_addr()
        .ok_or_else(|| RelayError::Config("bind address is unset".to_string()))?;

    let domain = if socket_addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;
    socket.bind(&socket_addr.into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into()).map_err(Into::into)
}

/// Emit one datagram, applying the hashed framing prefix when the relay runs
/// in that mode. Callers must not hold the state lock.
pub(crate) async fn send_packet(relay: &Relay, to: RelayAddress, payload: &[u8]) {
    let Some(addr) = to.to_socket_addr() else {
        debug!("dropping send to unset address");
        return;
    };

    if let Some(key) = relay.packet_hash_key {
        let mut framed = [0u8; crypto::PACKET_HASH_BYTES + MAX_PACKET_BYTES];
        let total = crypto::PACKET_HASH_BYTES + payload.len();
        framed[..crypto::PACKET_HASH_BYTES].copy_from_slice(&crypto::packet_hash(&key, payload));
        framed[crypto::PACKET_HASH_BYTES..total].copy_from_slice(payload);
        match relay.socket.send_to(&framed[..total], addr).await {
            Ok(sent) => relay.stats.add_sent(sent),
            Err(err) => warn!(%addr, error = %err, "failed to send packet"),
        }
        return;
    }

    match relay.socket.send_to(payload, addr).await {
        Ok(sent) => relay.stats.add_sent(sent),
        Err(err) => warn!(%addr, error = %err, "failed to send packet"),
    }
}
