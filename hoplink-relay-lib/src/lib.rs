#![forbid(unsafe_code)]

//! Library side of the hoplink relay: a UDP forwarder for encrypted game
//! sessions in a multi-hop routing overlay.
//!
//! Sessions are established by control-plane tokens rather than handshakes;
//! the relay decrypts its own token from a route request, remembers the flow
//! in an in-memory table, and afterwards forwards authenticated session
//! packets in both directions. Alongside the data plane it pings a mesh of
//! peer relays and reports latency stats and traffic counters to the backend
//! once per second.

pub mod backend;
pub mod config;
pub mod crypto;
pub mod error;
pub mod limiter;
pub mod net;
pub mod ping;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod stats;
pub mod token;
pub mod udp;
pub mod wire;

pub use error::{RelayError, Result};
