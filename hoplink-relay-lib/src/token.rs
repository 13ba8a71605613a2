//! Route and continue tokens.
//!
//! Both tokens are issued by the control plane and travel encrypted in an
//! authenticated box under (router key, relay key). The wire form is the
//! 24-byte random nonce followed by the box ciphertext.

use crate::crypto;
use crate::error::{RelayError, Result};
use crate::net::RelayAddress;
use crate::wire::{WireReader, WireWriter};

pub const ROUTE_TOKEN_BYTES: usize = 77;
pub const ENCRYPTED_ROUTE_TOKEN_BYTES: usize =
    crypto::BOX_NONCE_BYTES + ROUTE_TOKEN_BYTES + crypto::BOX_MAC_BYTES;

pub const CONTINUE_TOKEN_BYTES: usize = 18;
pub const ENCRYPTED_CONTINUE_TOKEN_BYTES: usize =
    crypto::BOX_NONCE_BYTES + CONTINUE_TOKEN_BYTES + crypto::BOX_MAC_BYTES;

/// Permission to create (or forward) a session, carrying the next hop and the
/// per-session header key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteToken {
    pub expire_timestamp: u64,
    pub session_id: u64,
    pub session_version: u8,
    pub session_flags: u8,
    pub kbps_up: u32,
    pub kbps_down: u32,
    pub next_address: RelayAddress,
    pub private_key: [u8; crypto::KEY_BYTES],
}

impl RouteToken {
    fn write(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_u64(self.expire_timestamp)?;
        writer.write_u64(self.session_id)?;
        writer.write_u8(self.session_version)?;
        writer.write_u8(self.session_flags)?;
        writer.write_u32(self.kbps_up)?;
        writer.write_u32(self.kbps_down)?;
        self.next_address.write(writer)?;
        writer.write_bytes(&self.private_key)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        let expire_timestamp = reader.read_u64()?;
        let session_id = reader.read_u64()?;
        let session_version = reader.read_u8()?;
        let session_flags = reader.read_u8()?;
        let kbps_up = reader.read_u32()?;
        let kbps_down = reader.read_u32()?;
        let next_address = RelayAddress::read(reader)?;
        let mut private_key = [0u8; crypto::KEY_BYTES];
        private_key.copy_from_slice(reader.read_bytes(crypto::KEY_BYTES)?);
        Ok(Self {
            expire_timestamp,
            session_id,
            session_version,
            session_flags,
            kbps_up,
            kbps_down,
            next_address,
            private_key,
        })
    }

    /// Encrypt into `out`, which must hold [`ENCRYPTED_ROUTE_TOKEN_BYTES`].
    pub fn write_encrypted(
        &self,
        out: &mut [u8],
        sender_secret: &[u8; crypto::KEY_BYTES],
        receiver_public: &[u8; crypto::KEY_BYTES],
    ) -> Result<()> {
        if out.len() < ENCRYPTED_ROUTE_TOKEN_BYTES {
            return Err(RelayError::WriteOverrun("route token"));
        }

        let mut nonce = [0u8; crypto::BOX_NONCE_BYTES];
        crypto::random_bytes(&mut nonce);

        let mut plaintext = [0u8; ROUTE_TOKEN_BYTES];
        let mut writer = WireWriter::new(&mut plaintext);
        self.write(&mut writer)?;
        debug_assert_eq!(writer.position(), ROUTE_TOKEN_BYTES);

        let sealed = crypto::box_seal(&plaintext, &nonce, receiver_public, sender_secret)?;
        out[..crypto::BOX_NONCE_BYTES].copy_from_slice(&nonce);
        out[crypto::BOX_NONCE_BYTES..ENCRYPTED_ROUTE_TOKEN_BYTES].copy_from_slice(&sealed);
        Ok(())
    }

    /// Decrypt from `input` (at least [`ENCRYPTED_ROUTE_TOKEN_BYTES`] long).
    /// Fails unless the box authenticator verifies.
    pub fn read_encrypted(
        input: &[u8],
        sender_public: &[u8; crypto::KEY_BYTES],
        receiver_secret: &[u8; crypto::KEY_BYTES],
    ) -> Result<Self> {
        if input.len() < ENCRYPTED_ROUTE_TOKEN_BYTES {
            return Err(RelayError::ReadOverrun("route token"));
        }

        let mut nonce = [0u8; crypto::BOX_NONCE_BYTES];
        nonce.copy_from_slice(&input[..crypto::BOX_NONCE_BYTES]);

        let plaintext = crypto::box_open(
            &input[crypto::BOX_NONCE_BYTES..ENCRYPTED_ROUTE_TOKEN_BYTES],
            &nonce,
            sender_public,
            receiver_secret,
        )?;
        Self::read(&mut WireReader::new(&plaintext))
    }
}

/// Permission to extend an existing session's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinueToken {
    pub expire_timestamp: u64,
    pub session_id: u64,
    pub session_version: u8,
    pub session_flags: u8,
}

impl ContinueToken {
    fn write(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.write_u64(self.expire_timestamp)?;
        writer.write_u64(self.session_id)?;
        writer.write_u8(self.session_version)?;
        writer.write_u8(self.session_flags)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            expire_timestamp: reader.read_u64()?,
            session_id: reader.read_u64()?,
            session_version: reader.read_u8()?,
            session_flags: reader.read_u8()?,
        })
    }

    /// Encrypt into `out`, which must hold [`ENCRYPTED_CONTINUE_TOKEN_BYTES`].
    pub fn write_encrypted(
        &self,
        out: &mut [u8],
        sender_secret: &[u8; crypto::KEY_BYTES],
        receiver_public: &[u8; crypto::KEY_BYTES],
    ) -> Result<()> {
        if out.len() < ENCRYPTED_CONTINUE_TOKEN_BYTES {
            return Err(RelayError::WriteOverrun("continue token"));
        }

        let mut nonce = [0u8; crypto::BOX_NONCE_BYTES];
        crypto::random_bytes(&mut nonce);

        let mut plaintext = [0u8; CONTINUE_TOKEN_BYTES];
        let mut writer = WireWriter::new(&mut plaintext);
        self.write(&mut writer)?;
        debug_assert_eq!(writer.position(), CONTINUE_TOKEN_BYTES);

        let sealed = crypto::box_seal(&plaintext, &nonce, receiver_public, sender_secret)?;
        out[..crypto::BOX_NONCE_BYTES].copy_from_slice(&nonce);
        out[crypto::BOX_NONCE_BYTES..ENCRYPTED_CONTINUE_TOKEN_BYTES].copy_from_slice(&sealed);
        Ok(())
    }

    /// Decrypt from `input` (at least [`ENCRYPTED_CONTINUE_TOKEN_BYTES`] long).
    pub fn read_encrypted(
        input: &[u8],
        sender_public: &[u8; crypto::KEY_BYTES],
        receiver_secret: &[u8; crypto::KEY_BYTES],
    ) -> Result<Self> {
        if input.len() < ENCRYPTED_CONTINUE_TOKEN_BYTES {
            return Err(RelayError::ReadOverrun("continue token"));
        }

        let mut nonce = [0u8; crypto::BOX_NONCE_BYTES];
        nonce.copy_from_slice(&input[..crypto::BOX_NONCE_BYTES]);

        let plaintext = crypto::box_open(
            &input[crypto::BOX_NONCE_BYTES..ENCRYPTED_CONTINUE_TOKEN_BYTES],
            &nonce,
            sender_public,
            receiver_secret,
        )?;
        Self::read(&mut WireReader::new(&plaintext))
    }
}
