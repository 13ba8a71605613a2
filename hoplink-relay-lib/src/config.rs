//! Environment-driven configuration.
//!
//! Everything the relay needs arrives in `RELAY_*` environment variables;
//! missing or malformed values are fatal at startup.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::crypto;
use crate::error::{RelayError, Result};
use crate::net::RelayAddress;

#[derive(Debug, Clone)]
pub struct Config {
    /// Public UDP bind address, including port.
    pub relay_address: RelayAddress,
    pub relay_public_key: [u8; crypto::KEY_BYTES],
    pub relay_private_key: [u8; crypto::KEY_BYTES],
    pub router_public_key: [u8; crypto::KEY_BYTES],
    /// Base URL of the control backend.
    pub backend_hostname: String,
    /// Log destination; stdout when unset.
    pub log_file: Option<String>,
    /// Nonzero suppresses verbose output.
    pub debug: i64,
    /// Enables the hashed framing mode when present.
    pub packet_hash_key: Option<[u8; crypto::KEY_BYTES]>,
}

fn required(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|_| RelayError::Config(format!("{name} not set")))
}

fn decode_key(name: &'static str, value: &str) -> Result<[u8; crypto::KEY_BYTES]> {
    let decoded = BASE64
        .decode(value)
        .map_err(|_| RelayError::Config(format!("invalid {name}")))?;
    decoded
        .try_into()
        .map_err(|_| RelayError::Config(format!("invalid {name}")))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let relay_address = required("RELAY_ADDRESS")?
            .parse::<RelayAddress>()
            .map_err(|e| RelayError::Config(format!("invalid RELAY_ADDRESS: {e}")))?;

        let relay_public_key = decode_key("RELAY_PUBLIC_KEY", &required("RELAY_PUBLIC_KEY")?)?;
        let relay_private_key = decode_key("RELAY_PRIVATE_KEY", &required("RELAY_PRIVATE_KEY")?)?;
        let router_public_key =
            decode_key("RELAY_ROUTER_PUBLIC_KEY", &required("RELAY_ROUTER_PUBLIC_KEY")?)?;

        let backend_hostname = required("RELAY_BACKEND_HOSTNAME")?;

        let log_file = std::env::var("RELAY_LOG_FILE").ok();

        let debug = std::env::var("RELAY_DEBUG")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0);

        let packet_hash_key = match std::env::var("RELAY_PACKET_HASH_KEY") {
            Ok(value) => Some(decode_key("RELAY_PACKET_HASH_KEY", &value)?),
            Err(_) => None,
        };

        Ok(Self {
            relay_address,
            relay_public_key,
            relay_private_key,
            router_public_key,
            backend_hostname,
            log_file,
            debug,
            packet_hash_key,
        })
    }

    /// The textual form reported to the backend.
    pub fn relay_address_string(&self) -> String {
        self.relay_address.to_string()
    }
}
