//! Binary bodies for the init and update RPCs.

use crate::crypto;
use crate::error::{RelayError, Result};
use crate::net::{RelayAddress, MAX_ADDRESS_STRING_LENGTH};
use crate::ping::{PeerRelay, PeerStats, MAX_RELAYS};
use crate::wire::{WireReader, WireWriter};

pub const RELAY_TOKEN_BYTES: usize = 32;
pub const RELAY_VERSION_STRING: &str = "1.1.2";

const INIT_REQUEST_MAGIC: u32 = 0x9083708f;
const INIT_REQUEST_VERSION: u32 = 0;
const INIT_RESPONSE_VERSION: u32 = 0;
const UPDATE_REQUEST_VERSION: u32 = 0;
const UPDATE_RESPONSE_VERSION: u32 = 0;

const INIT_RESPONSE_BYTES: usize = 4 + 8 + RELAY_TOKEN_BYTES;

/// Init request: magic, version, box nonce, relay address, then the current
/// relay token sealed for the router.
pub fn write_init_request(
    relay_address: &str,
    relay_token: &[u8; RELAY_TOKEN_BYTES],
    router_public_key: &[u8; crypto::KEY_BYTES],
    relay_private_key: &[u8; crypto::KEY_BYTES],
) -> Result<Vec<u8>> {
    let mut nonce = [0u8; crypto::BOX_NONCE_BYTES];
    crypto::random_bytes(&mut nonce);

    let sealed = crypto::box_seal(relay_token, &nonce, router_public_key, relay_private_key)?;

    let capacity = 4 + 4 + crypto::BOX_NONCE_BYTES + 4 + relay_address.len() + sealed.len();
    let mut body = vec![0u8; capacity];
    let mut writer = WireWriter::new(&mut body);
    writer.write_u32(INIT_REQUEST_MAGIC)?;
    writer.write_u32(INIT_REQUEST_VERSION)?;
    writer.write_bytes(&nonce)?;
    writer.write_string(relay_address)?;
    writer.write_bytes(&sealed)?;
    debug_assert_eq!(writer.position(), capacity);
    Ok(body)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitResponse {
    pub router_timestamp: u64,
    pub relay_token: [u8; RELAY_TOKEN_BYTES],
}

pub fn read_init_response(body: &[u8]) -> Result<InitResponse> {
    if body.len() != INIT_RESPONSE_BYTES {
        return Err(RelayError::Backend(format!(
            "bad init response size, expected {INIT_RESPONSE_BYTES} bytes, got {}",
            body.len()
        )));
    }

    let mut reader = WireReader::new(body);
    let version = reader.read_u32()?;
    if version != INIT_RESPONSE_VERSION {
        return Err(RelayError::Backend(format!(
            "bad init response version, expected {INIT_RESPONSE_VERSION}, got {version}"
        )));
    }

    let router_timestamp = reader.read_u64()?;
    let mut relay_token = [0u8; RELAY_TOKEN_BYTES];
    relay_token.copy_from_slice(reader.read_bytes(RELAY_TOKEN_BYTES)?);
    Ok(InitResponse { router_timestamp, relay_token })
}

pub struct UpdateData<'a> {
    pub relay_address: &'a str,
    pub relay_token: &'a [u8; RELAY_TOKEN_BYTES],
    pub peer_stats: &'a [PeerStats],
    pub session_count: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub shutdown: bool,
}

/// Update request: version, address, token, the ping-stats table, then the
/// traffic snapshot and the shutdown flag.
pub fn write_update_request(data: &UpdateData<'_>) -> Result<Vec<u8>> {
    let capacity = 4
        + 4
        + data.relay_address.len()
        + RELAY_TOKEN_BYTES
        + 4
        + data.peer_stats.len() * (8 + 4 + 4 + 4)
        + 8
        + 8
        + 8
        + 1
        + 8
        + 8
        + 4
        + RELAY_VERSION_STRING.len();
    let mut body = vec![0u8; capacity];
    let mut writer = WireWriter::new(&mut body);

    writer.write_u32(UPDATE_REQUEST_VERSION)?;
    writer.write_string(data.relay_address)?;
    writer.write_bytes(data.relay_token)?;

    writer.write_u32(data.peer_stats.len() as u32)?;
    for stats in data.peer_stats {
        writer.write_u64(stats.id)?;
        writer.write_f32(stats.rtt)?;
        writer.write_f32(stats.jitter)?;
        writer.write_f32(stats.packet_loss)?;
    }

    writer.write_u64(data.session_count)?;
    writer.write_u64(data.bytes_sent)?;
    writer.write_u64(data.bytes_received)?;
    writer.write_u8(u8::from(data.shutdown))?;
    writer.write_f64(0.0)?; // cpu usage
    writer.write_f64(0.0)?; // memory usage
    writer.write_string(RELAY_VERSION_STRING)?;

    debug_assert_eq!(writer.position(), capacity);
    Ok(body)
}

/// Update response: version, then the peer relay list to ping.
pub fn read_update_response(body: &[u8]) -> Result<Vec<PeerRelay>> {
    let mut reader = WireReader::new(body);

    let version = reader.read_u32()?;
    if version != UPDATE_RESPONSE_VERSION {
        return Err(RelayError::Backend(format!(
            "bad update response version, expected {UPDATE_RESPONSE_VERSION}, got {version}"
        )));
    }

    let count = reader.read_u32()? as usize;
    if count > MAX_RELAYS {
        return Err(RelayError::Backend(format!(
            "too many relays to ping, max is {MAX_RELAYS}, got {count}"
        )));
    }

    let mut peers = Vec::with_capacity(count);
    for _ in 0..count {
        let id = reader.read_u64()?;
        let address_string = reader.read_string(MAX_ADDRESS_STRING_LENGTH)?;
        let address: RelayAddress = address_string
            .parse()
            .map_err(|_| RelayError::Backend(format!("bad relay address '{address_string}'")))?;
        peers.push(PeerRelay { id, address });
    }
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> ([u8; 32], [u8; 32]) {
        let mut secret = [0u8; 32];
        crypto::random_bytes(&mut secret);
        (secret, crypto::box_public_key(&secret))
    }

    #[test]
    fn init_request_layout_and_token_seal() {
        let (relay_secret, relay_public) = keypair();
        let (router_secret, router_public) = keypair();
        let token = [0x5au8; RELAY_TOKEN_BYTES];

        let body =
            write_init_request("10.0.0.1:40000", &token, &router_public, &relay_secret).unwrap();

        let mut reader = WireReader::new(&body);
        assert_eq!(reader.read_u32().unwrap(), INIT_REQUEST_MAGIC);
        assert_eq!(reader.read_u32().unwrap(), 0);
        let mut nonce = [0u8; crypto::BOX_NONCE_BYTES];
        nonce.copy_from_slice(reader.read_bytes(crypto::BOX_NONCE_BYTES).unwrap());
        assert_eq!(reader.read_string(256).unwrap(), "10.0.0.1:40000");

        let sealed = reader.read_bytes(reader.remaining()).unwrap();
        assert_eq!(sealed.len(), RELAY_TOKEN_BYTES + crypto::BOX_MAC_BYTES);
        let opened = crypto::box_open(sealed, &nonce, &relay_public, &router_secret).unwrap();
        assert_eq!(opened, token);
    }

    #[test]
    fn init_response_round_trip() {
        let mut body = [0u8; INIT_RESPONSE_BYTES];
        let mut writer = WireWriter::new(&mut body);
        writer.write_u32(0).unwrap();
        writer.write_u64(1_600_000_000).unwrap();
        writer.write_bytes(&[0x77u8; RELAY_TOKEN_BYTES]).unwrap();

        let parsed = read_init_response(&body).unwrap();
        assert_eq!(parsed.router_timestamp, 1_600_000_000);
        assert_eq!(parsed.relay_token, [0x77u8; RELAY_TOKEN_BYTES]);
    }

    #[test]
    fn init_response_rejects_bad_size_and_version() {
        assert!(read_init_response(&[0u8; 4]).is_err());

        let mut body = [0u8; INIT_RESPONSE_BYTES];
        WireWriter::new(&mut body).write_u32(9).unwrap();
        assert!(read_init_response(&body).is_err());
    }

    #[test]
    fn update_request_layout() {
        let stats = [
            PeerStats { id: 11, rtt: 12.5, jitter: 1.5, packet_loss: 0.0 },
            PeerStats { id: 22, rtt: 80.0, jitter: 9.0, packet_loss: 25.0 },
        ];
        let body = write_update_request(&UpdateData {
            relay_address: "127.0.0.1:40000",
            relay_token: &[1u8; RELAY_TOKEN_BYTES],
            peer_stats: &stats,
            session_count: 3,
            bytes_sent: 1000,
            bytes_received: 2000,
            shutdown: true,
        })
        .unwrap();

        let mut reader = WireReader::new(&body);
        assert_eq!(reader.read_u32().unwrap(), 0);
        assert_eq!(reader.read_string(256).unwrap(), "127.0.0.1:40000");
        assert_eq!(reader.read_bytes(RELAY_TOKEN_BYTES).unwrap(), &[1u8; 32]);

        assert_eq!(reader.read_u32().unwrap(), 2);
        assert_eq!(reader.read_u64().unwrap(), 11);
        assert_eq!(reader.read_f32().unwrap(), 12.5);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_f32().unwrap(), 0.0);
        assert_eq!(reader.read_u64().unwrap(), 22);
        reader.read_f32().unwrap();
        reader.read_f32().unwrap();
        reader.read_f32().unwrap();

        assert_eq!(reader.read_u64().unwrap(), 3);
        assert_eq!(reader.read_u64().unwrap(), 1000);
        assert_eq!(reader.read_u64().unwrap(), 2000);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_f64().unwrap(), 0.0);
        assert_eq!(reader.read_f64().unwrap(), 0.0);
        assert_eq!(reader.read_string(64).unwrap(), RELAY_VERSION_STRING);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn update_response_round_trip() {
        let mut body = [0u8; 256];
        let mut writer = WireWriter::new(&mut body);
        writer.write_u32(0).unwrap();
        writer.write_u32(2).unwrap();
        writer.write_u64(7).unwrap();
        writer.write_string("10.1.1.1:30000").unwrap();
        writer.write_u64(8).unwrap();
        writer.write_string("[::1]:30001").unwrap();
        let length = writer.position();

        let peers = read_update_response(&body[..length]).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].id, 7);
        assert_eq!(peers[0].address, "10.1.1.1:30000".parse().unwrap());
        assert_eq!(peers[1].id, 8);
        assert_eq!(peers[1].address, "[::1]:30001".parse().unwrap());
    }

    #[test]
    fn update_response_rejects_oversized_lists_and_bad_addresses() {
        let mut body = [0u8; 16];
        let mut writer = WireWriter::new(&mut body);
        writer.write_u32(0).unwrap();
        writer.write_u32(MAX_RELAYS as u32 + 1).unwrap();
        let length = writer.position();
        assert!(read_update_response(&body[..length]).is_err());

        let mut body = [0u8; 64];
        let mut writer = WireWriter::new(&mut body);
        writer.write_u32(0).unwrap();
        writer.write_u32(1).unwrap();
        writer.write_u64(7).unwrap();
        writer.write_string("nonsense").unwrap();
        let length = writer.position();
        assert!(read_update_response(&body[..length]).is_err());
    }
}
