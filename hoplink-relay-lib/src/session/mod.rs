//! Session records and the in-memory session table.

pub mod replay;

use std::collections::HashMap;

use crate::crypto;
use crate::net::RelayAddress;
use crate::token::RouteToken;
use replay::ReplayProtection;

/// Table key. Versions are small and ids are random 64-bit values, so the
/// xor is collision-tolerant in practice for the lifetime of a session; two
/// live sessions whose ids differ only in the low byte by the xor of their
/// versions would collide, and the first one wins.
pub fn session_key(session_id: u64, session_version: u8) -> u64 {
    session_id ^ u64::from(session_version)
}

/// State for one forwarded flow, created by a route request and mutated only
/// under the relay state lock.
#[derive(Debug, Clone)]
pub struct Session {
    pub expire_timestamp: u64,
    pub session_id: u64,
    pub session_version: u8,
    pub client_to_server_sequence: u64,
    pub server_to_client_sequence: u64,
    pub kbps_up: u32,
    pub kbps_down: u32,
    /// Last hop toward the client.
    pub prev_address: RelayAddress,
    /// Next hop toward the server.
    pub next_address: RelayAddress,
    pub private_key: [u8; crypto::KEY_BYTES],
    pub replay_client_to_server: ReplayProtection,
    pub replay_server_to_client: ReplayProtection,
}

impl Session {
    pub fn from_route_token(token: &RouteToken, prev_address: RelayAddress) -> Self {
        Self {
            expire_timestamp: token.expire_timestamp,
            session_id: token.session_id,
            session_version: token.session_version,
            client_to_server_sequence: 0,
            server_to_client_sequence: 0,
            kbps_up: token.kbps_up,
            kbps_down: token.kbps_down,
            prev_address,
            next_address: token.next_address,
            private_key: token.private_key,
            replay_client_to_server: ReplayProtection::new(),
            replay_server_to_client: ReplayProtection::new(),
        }
    }

    pub fn key(&self) -> u64 {
        session_key(self.session_id, self.session_version)
    }

    pub fn expired(&self, router_time: u64) -> bool {
        self.expire_timestamp < router_time
    }
}

/// Map from session key to session state. Entries are never removed at
/// runtime; every lookup re-checks the expire timestamp instead.
#[derive(Default)]
pub struct SessionMap {
    inner: HashMap<u64, Session, ahash::RandomState>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut Session> {
        self.inner.get_mut(&key)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.inner.contains_key(&key)
    }

    /// Insert only if the key is unoccupied. Returns true when the session
    /// was created.
    pub fn insert_if_absent(&mut self, session: Session) -> bool {
        let key = session.key();
        if self.inner.contains_key(&key) {
            return false;
        }
        self.inner.insert(key, session);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.inner.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token() -> RouteToken {
        RouteToken {
            expire_timestamp: 100,
            session_id: 0xabcdef,
            session_version: 3,
            session_flags: 0,
            kbps_up: 256,
            kbps_down: 512,
            next_address: "10.0.0.2:30000".parse().unwrap(),
            private_key: [7u8; 32],
        }
    }

    #[test]
    fn key_is_id_xor_version() {
        assert_eq!(session_key(0xabcdef, 3), 0xabcdef ^ 3);
        assert_eq!(session_key(0, 0), 0);
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let mut sessions = SessionMap::new();
        let prev: RelayAddress = "10.0.0.1:20000".parse().unwrap();

        let session = Session::from_route_token(&sample_token(), prev);
        let key = session.key();
        assert!(sessions.insert_if_absent(session.clone()));
        assert!(!sessions.insert_if_absent(session));
        assert_eq!(sessions.len(), 1);
        assert!(sessions.get_mut(key).is_some());
    }

    #[test]
    fn a_second_route_request_does_not_clobber_state() {
        let mut sessions = SessionMap::new();
        let prev: RelayAddress = "10.0.0.1:20000".parse().unwrap();

        let session = Session::from_route_token(&sample_token(), prev);
        sessions.insert_if_absent(session.clone());
        sessions.get_mut(session.key()).unwrap().client_to_server_sequence = 42;

        sessions.insert_if_absent(session.clone());
        assert_eq!(
            sessions.get_mut(session.key()).unwrap().client_to_server_sequence,
            42
        );
    }

    #[test]
    fn expiry_check_uses_router_time() {
        let prev: RelayAddress = "10.0.0.1:20000".parse().unwrap();
        let session = Session::from_route_token(&sample_token(), prev);
        assert!(!session.expired(100));
        assert!(session.expired(101));
    }
}
