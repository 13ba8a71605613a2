//! Packet type tags, sequence-number flag bits, and the 35-byte
//! authenticated session header.
//!
//! Layout of the header:
//!
//! ```text
//! byte 0      packet type
//! bytes 1-8   sequence, little-endian; bit 63 = direction (1 = server to
//!             client), bit 62 = response class
//! bytes 9-16  session id
//! byte 17     session version
//! byte 18     reserved, zero
//! bytes 19-34 ChaCha20-Poly1305 tag over empty plaintext with
//!             additional data = bytes 9..19 and nonce = 0u32 || sequence
//! ```

use crate::crypto;
use crate::error::{RelayError, Result};

pub const ROUTE_REQUEST_PACKET: u8 = 1;
pub const ROUTE_RESPONSE_PACKET: u8 = 2;
pub const CLIENT_TO_SERVER_PACKET: u8 = 3;
pub const SERVER_TO_CLIENT_PACKET: u8 = 4;
pub const SESSION_PING_PACKET: u8 = 11;
pub const SESSION_PONG_PACKET: u8 = 12;
pub const CONTINUE_REQUEST_PACKET: u8 = 13;
pub const CONTINUE_RESPONSE_PACKET: u8 = 14;
pub const NEAR_PING_PACKET: u8 = 73;
pub const NEAR_PONG_PACKET: u8 = 74;
pub const RELAY_PING_PACKET: u8 = 75;
pub const RELAY_PONG_PACKET: u8 = 76;

pub const HEADER_BYTES: usize = 35;
pub const MTU: usize = 1300;
pub const MAX_PACKET_BYTES: usize = 1500;

pub const RELAY_PING_PACKET_BYTES: usize = 9;
pub const NEAR_PING_PACKET_BYTES: usize = 33;
/// A near pong reflects only the leading bytes of the probe; the 16-byte
/// trailing measurement signature is not echoed.
pub const NEAR_PONG_PACKET_BYTES: usize = 17;

const DIRECTION_BIT: u64 = 1 << 63;
const RESPONSE_CLASS_BIT: u64 = 1 << 62;
const SEQUENCE_MASK: u64 = !(DIRECTION_BIT | RESPONSE_CLASS_BIT);

const ADDITIONAL_OFFSET: usize = 9;
const ADDITIONAL_BYTES: usize = 8 + 2;
const TAG_OFFSET: usize = ADDITIONAL_OFFSET + ADDITIONAL_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Strip the direction and response-class bits, leaving the sequence value
/// the replay window and high-water comparisons operate on. This is the only
/// place the flag mask lives.
pub fn clean_sequence(sequence: u64) -> u64 {
    sequence & SEQUENCE_MASK
}

/// Session ping/pong and route/continue responses set bit 62 of the sequence.
pub fn is_response_class(packet_type: u8) -> bool {
    matches!(
        packet_type,
        SESSION_PING_PACKET | SESSION_PONG_PACKET | ROUTE_RESPONSE_PACKET | CONTINUE_RESPONSE_PACKET
    )
}

fn check_sequence_bits(direction: Direction, packet_type: u8, sequence: u64) -> Result<()> {
    match direction {
        Direction::ServerToClient => {
            if sequence & DIRECTION_BIT == 0 {
                return Err(RelayError::Header("direction bit clear"));
            }
        }
        Direction::ClientToServer => {
            if sequence & DIRECTION_BIT != 0 {
                return Err(RelayError::Header("direction bit set"));
            }
        }
    }

    if is_response_class(packet_type) {
        if sequence & RESPONSE_CLASS_BIT == 0 {
            return Err(RelayError::Header("response bit clear"));
        }
    } else if sequence & RESPONSE_CLASS_BIT != 0 {
        return Err(RelayError::Header("response bit set"));
    }

    Ok(())
}

fn header_nonce(sequence: u64) -> [u8; crypto::HEADER_NONCE_BYTES] {
    let mut nonce = [0u8; crypto::HEADER_NONCE_BYTES];
    nonce[4..].copy_from_slice(&sequence.to_le_bytes());
    nonce
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeekedHeader {
    pub packet_type: u8,
    pub sequence: u64,
    pub session_id: u64,
    pub session_version: u8,
}

/// Write a full 35-byte header into `buffer`.
pub fn write_header(
    direction: Direction,
    packet_type: u8,
    sequence: u64,
    session_id: u64,
    session_version: u8,
    private_key: &[u8; crypto::KEY_BYTES],
    buffer: &mut [u8],
) -> Result<()> {
    if buffer.len() < HEADER_BYTES {
        return Err(RelayError::WriteOverrun("header"));
    }
    check_sequence_bits(direction, packet_type, sequence)?;

    buffer[0] = packet_type;
    buffer[1..9].copy_from_slice(&sequence.to_le_bytes());
    buffer[9..17].copy_from_slice(&session_id.to_le_bytes());
    buffer[17] = session_version;
    buffer[18] = 0;

    let additional: [u8; ADDITIONAL_BYTES] = buffer[ADDITIONAL_OFFSET..TAG_OFFSET]
        .try_into()
        .expect("additional data slice is fixed width");
    let tag = crypto::header_seal(&additional, &header_nonce(sequence), private_key)?;
    buffer[TAG_OFFSET..HEADER_BYTES].copy_from_slice(&tag);
    Ok(())
}

/// Read the plaintext fields of a header without touching the tag, enforcing
/// the direction and response-class bit invariants.
pub fn peek_header(direction: Direction, buffer: &[u8]) -> Result<PeekedHeader> {
    if buffer.len() < HEADER_BYTES {
        return Err(RelayError::Header("short header"));
    }

    let packet_type = buffer[0];
    let sequence = u64::from_le_bytes(buffer[1..9].try_into().expect("fixed width"));
    check_sequence_bits(direction, packet_type, sequence)?;

    let session_id = u64::from_le_bytes(buffer[9..17].try_into().expect("fixed width"));
    let session_version = buffer[17];

    Ok(PeekedHeader { packet_type, sequence, session_id, session_version })
}

/// Recompute and check the header tag. The ciphertext area is untouched on
/// success (the plaintext is empty).
pub fn verify_header(
    direction: Direction,
    private_key: &[u8; crypto::KEY_BYTES],
    buffer: &[u8],
) -> Result<()> {
    if buffer.len() < HEADER_BYTES {
        return Err(RelayError::Header("short header"));
    }

    let packet_type = buffer[0];
    let sequence = u64::from_le_bytes(buffer[1..9].try_into().expect("fixed width"));
    check_sequence_bits(direction, packet_type, sequence)?;

    let additional: [u8; ADDITIONAL_BYTES] = buffer[ADDITIONAL_OFFSET..TAG_OFFSET]
        .try_into()
        .expect("fixed width");
    let tag: [u8; crypto::HEADER_MAC_BYTES] = buffer[TAG_OFFSET..HEADER_BYTES]
        .try_into()
        .expect("fixed width");

    crypto::header_verify(&tag, &additional, &header_nonce(sequence), private_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        crypto::random_bytes(&mut key);
        key
    }

    #[test]
    fn sequence_mask_strips_flag_bits() {
        let sequence = (1u64 << 63) | (1u64 << 62) | 12345;
        assert_eq!(clean_sequence(sequence), 12345);
        assert_eq!(clean_sequence(12345), 12345);
    }

    #[test]
    fn header_round_trip() {
        let key = random_key();
        let sequence: u64 = 123123130131;
        let session_id: u64 = 0x12313131;
        let session_version: u8 = 0x12;

        let mut buffer = [0u8; HEADER_BYTES];
        write_header(
            Direction::ClientToServer,
            CLIENT_TO_SERVER_PACKET,
            sequence,
            session_id,
            session_version,
            &key,
            &mut buffer,
        )
        .unwrap();

        let peeked = peek_header(Direction::ClientToServer, &buffer).unwrap();
        assert_eq!(peeked.packet_type, CLIENT_TO_SERVER_PACKET);
        assert_eq!(peeked.sequence, sequence);
        assert_eq!(peeked.session_id, session_id);
        assert_eq!(peeked.session_version, session_version);

        verify_header(Direction::ClientToServer, &key, &buffer).unwrap();
    }

    #[test]
    fn header_round_trip_server_to_client() {
        let key = random_key();
        let sequence = (1u64 << 63) | (1u64 << 62) | 7;

        let mut buffer = [0u8; HEADER_BYTES];
        write_header(
            Direction::ServerToClient,
            ROUTE_RESPONSE_PACKET,
            sequence,
            99,
            3,
            &key,
            &mut buffer,
        )
        .unwrap();

        let peeked = peek_header(Direction::ServerToClient, &buffer).unwrap();
        assert_eq!(peeked.sequence, sequence);
        verify_header(Direction::ServerToClient, &key, &buffer).unwrap();
    }

    #[test]
    fn tampering_fails_verification() {
        let key = random_key();
        let mut buffer = [0u8; HEADER_BYTES];
        write_header(
            Direction::ClientToServer,
            CLIENT_TO_SERVER_PACKET,
            1000,
            42,
            1,
            &key,
            &mut buffer,
        )
        .unwrap();

        for i in 9..HEADER_BYTES {
            let mut copy = buffer;
            copy[i] ^= 1;
            assert!(
                verify_header(Direction::ClientToServer, &key, &copy).is_err(),
                "flipping byte {i} must fail verification"
            );
        }
    }

    #[test]
    fn direction_bit_is_enforced() {
        let key = random_key();

        let mut c2s = [0u8; HEADER_BYTES];
        write_header(
            Direction::ClientToServer,
            CLIENT_TO_SERVER_PACKET,
            5,
            1,
            1,
            &key,
            &mut c2s,
        )
        .unwrap();
        assert!(peek_header(Direction::ServerToClient, &c2s).is_err());

        let mut s2c = [0u8; HEADER_BYTES];
        write_header(
            Direction::ServerToClient,
            SERVER_TO_CLIENT_PACKET,
            (1u64 << 63) | 5,
            1,
            1,
            &key,
            &mut s2c,
        )
        .unwrap();
        assert!(peek_header(Direction::ClientToServer, &s2c).is_err());
    }

    #[test]
    fn response_class_bit_is_enforced() {
        let key = random_key();

        // session pong without bit 62 must be rejected at write and at peek
        let sequence = 1u64 << 63;
        let mut buffer = [0u8; HEADER_BYTES];
        assert!(write_header(
            Direction::ServerToClient,
            SESSION_PONG_PACKET,
            sequence,
            1,
            1,
            &key,
            &mut buffer,
        )
        .is_err());

        write_header(
            Direction::ServerToClient,
            SERVER_TO_CLIENT_PACKET,
            sequence | 1,
            1,
            1,
            &key,
            &mut buffer,
        )
        .unwrap();
        // rewrite the type so it claims to be response-class
        buffer[0] = SESSION_PONG_PACKET;
        assert!(peek_header(Direction::ServerToClient, &buffer).is_err());
        assert!(verify_header(Direction::ServerToClient, &key, &buffer).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key = random_key();
        let other = random_key();
        let mut buffer = [0u8; HEADER_BYTES];
        write_header(
            Direction::ClientToServer,
            CLIENT_TO_SERVER_PACKET,
            1,
            1,
            1,
            &key,
            &mut buffer,
        )
        .unwrap();
        assert!(verify_header(Direction::ClientToServer, &other, &buffer).is_err());
    }

    #[test]
    fn reserved_byte_is_zero_and_bound_by_the_tag() {
        let key = random_key();
        let mut buffer = [0u8; HEADER_BYTES];
        write_header(
            Direction::ClientToServer,
            CLIENT_TO_SERVER_PACKET,
            1,
            1,
            1,
            &key,
            &mut buffer,
        )
        .unwrap();
        assert_eq!(buffer[18], 0);

        buffer[18] = 1;
        assert!(verify_header(Direction::ClientToServer, &key, &buffer).is_err());
    }
}
