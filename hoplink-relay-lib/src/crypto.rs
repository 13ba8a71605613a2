//! Thin wrappers over the cryptographic primitives the relay uses.
//!
//! Tokens travel inside an authenticated public-key box (X25519 +
//! XSalsa20-Poly1305, 24-byte nonce). Session headers carry a detached
//! ChaCha20-Poly1305-IETF tag over empty plaintext. The control plane signs
//! with detached Ed25519 signatures, and the optional hashed framing mode
//! prefixes packets with a keyed BLAKE2 digest.

use blake2::digest::consts::U8;
use blake2::digest::{KeyInit as MacKeyInit, Mac};
use blake2::Blake2bMac;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, KeyInit};
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{RelayError, Result};

pub const KEY_BYTES: usize = 32;
pub const BOX_NONCE_BYTES: usize = 24;
pub const BOX_MAC_BYTES: usize = 16;
pub const HEADER_NONCE_BYTES: usize = 12;
pub const HEADER_MAC_BYTES: usize = 16;
pub const SIGNATURE_BYTES: usize = 64;
pub const PACKET_HASH_BYTES: usize = 8;

type PacketMac = Blake2bMac<U8>;

/// Fill the buffer with cryptographically secure random bytes.
pub fn random_bytes(out: &mut [u8]) {
    OsRng.fill_bytes(out);
}

/// Derive the public half of an X25519 keypair.
pub fn box_public_key(secret: &[u8; KEY_BYTES]) -> [u8; KEY_BYTES] {
    let secret = SecretKey::from(*secret);
    *secret.public_key().as_bytes()
}

/// Seal `plaintext` for `receiver_public` from `sender_secret`.
///
/// Returns ciphertext plus the 16-byte authenticator.
pub fn box_seal(
    plaintext: &[u8],
    nonce: &[u8; BOX_NONCE_BYTES],
    receiver_public: &[u8; KEY_BYTES],
    sender_secret: &[u8; KEY_BYTES],
) -> Result<Vec<u8>> {
    let sender = SecretKey::from(*sender_secret);
    let receiver = PublicKey::from(*receiver_public);
    SalsaBox::new(&receiver, &sender)
        .encrypt(GenericArray::from_slice(nonce), plaintext)
        .map_err(|_| RelayError::Crypto("box seal"))
}

/// Open a sealed box. Fails unless the authenticator verifies.
pub fn box_open(
    ciphertext: &[u8],
    nonce: &[u8; BOX_NONCE_BYTES],
    sender_public: &[u8; KEY_BYTES],
    receiver_secret: &[u8; KEY_BYTES],
) -> Result<Vec<u8>> {
    let receiver = SecretKey::from(*receiver_secret);
    let sender = PublicKey::from(*sender_public);
    SalsaBox::new(&sender, &receiver)
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| RelayError::Crypto("box open"))
}

/// Authenticate `additional` under `key`/`nonce`, returning the detached tag.
/// The plaintext is empty: only the associated data is bound.
pub fn header_seal(
    additional: &[u8],
    nonce: &[u8; HEADER_NONCE_BYTES],
    key: &[u8; KEY_BYTES],
) -> Result<[u8; HEADER_MAC_BYTES]> {
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), additional, &mut [])
        .map_err(|_| RelayError::Crypto("header seal"))?;
    Ok(tag.into())
}

/// Verify a detached header tag produced by [`header_seal`].
pub fn header_verify(
    tag: &[u8; HEADER_MAC_BYTES],
    additional: &[u8],
    nonce: &[u8; HEADER_NONCE_BYTES],
    key: &[u8; KEY_BYTES],
) -> Result<()> {
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            additional,
            &mut [],
            GenericArray::from_slice(tag),
        )
        .map_err(|_| RelayError::Crypto("header verify"))
}

/// Detached Ed25519 signature over `message`.
pub fn sign(message: &[u8], signing_key: &[u8; KEY_BYTES]) -> [u8; SIGNATURE_BYTES] {
    let key = SigningKey::from_bytes(signing_key);
    key.sign(message).to_bytes()
}

/// Verify a detached Ed25519 signature.
pub fn verify_signature(
    message: &[u8],
    signature: &[u8; SIGNATURE_BYTES],
    verify_key: &[u8; KEY_BYTES],
) -> Result<()> {
    let key = VerifyingKey::from_bytes(verify_key).map_err(|_| RelayError::Crypto("verify key"))?;
    key.verify(message, &Signature::from_bytes(signature))
        .map_err(|_| RelayError::Crypto("signature"))
}

/// Keyed 8-byte BLAKE2 digest used by the hashed framing mode.
pub fn packet_hash(key: &[u8; KEY_BYTES], data: &[u8]) -> [u8; PACKET_HASH_BYTES] {
    let mut mac = <PacketMac as MacKeyInit>::new_from_slice(key)
        .expect("BLAKE2 accepts 32-byte keys");
    mac.update(data);
    mac.finalize().into_bytes().into()
}
