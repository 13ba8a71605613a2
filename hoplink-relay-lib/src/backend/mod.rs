//! Control-plane client: the init/update RPC loop over HTTPS.
//!
//! Both RPCs POST little-endian binary bodies. Init authenticates this relay
//! to the router and anchors the router clock; update runs once per second,
//! reporting ping stats and traffic counters and receiving the peer relay
//! mesh back.

pub mod codec;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::relay::Relay;

pub use codec::{
    read_init_response, read_update_response, write_init_request, write_update_request,
    InitResponse, UpdateData, RELAY_TOKEN_BYTES, RELAY_VERSION_STRING,
};

const USER_AGENT: &str = "network next relay";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
const UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Init attempts before startup is declared failed.
const INIT_ATTEMPTS: u32 = 60;
/// Consecutive update failures that abort the process.
const UPDATE_FAILURE_LIMIT: u32 = 11;
/// Successful updates in a row that forgive accumulated failures.
const UPDATE_SUCCESS_RESET: u32 = 10;

/// Shutdown-drain bounds: update attempts carrying the shutdown flag, and
/// the grace period granted to the control plane once one is acknowledged.
const DRAIN_ATTEMPTS: u32 = 60;
const DRAIN_GRACE: Duration = Duration::from_secs(30);

pub struct BackendClient {
    http: reqwest::Client,
    init_url: String,
    update_url: String,
    relay_address: String,
    router_public_key: [u8; 32],
    relay_private_key: [u8; 32],
    relay_token: [u8; RELAY_TOKEN_BYTES],
}

impl BackendClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RelayError::Backend(format!("could not build http client: {err}")))?;

        Ok(Self {
            http,
            init_url: format!("{}/relay_init", config.backend_hostname),
            update_url: format!("{}/relay_update", config.backend_hostname),
            relay_address: config.relay_address_string(),
            router_public_key: config.router_public_key,
            relay_private_key: config.relay_private_key,
            relay_token: [0u8; RELAY_TOKEN_BYTES],
        })
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<bytes::Bytes> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|err| RelayError::Backend(format!("post failed: {err}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RelayError::Backend(format!("response was {status}, expected 200")));
        }
        response
            .bytes()
            .await
            .map_err(|err| RelayError::Backend(format!("could not read response body: {err}")))
    }

    async fn try_init(&mut self) -> Result<u64> {
        let body = write_init_request(
            &self.relay_address,
            &self.relay_token,
            &self.router_public_key,
            &self.relay_private_key,
        )?;
        let response = self.post(&self.init_url, body).await?;
        let parsed = read_init_response(&response)?;
        self.relay_token = parsed.relay_token;
        Ok(parsed.router_timestamp)
    }

    /// Register with the backend, retrying once per second. Returns the
    /// router timestamp that anchors the relay clock.
    pub async fn initialize(&mut self) -> Result<u64> {
        for attempt in 1..=INIT_ATTEMPTS {
            match self.try_init().await {
                Ok(router_timestamp) => {
                    info!(attempt, router_timestamp, "relay initialized with backend");
                    return Ok(router_timestamp);
                }
                Err(err) => debug!(attempt, error = %err, "backend init attempt failed"),
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(RelayError::Backend(format!(
            "could not initialize relay after {INIT_ATTEMPTS} attempts"
        )))
    }

    /// One update round trip: snapshot counters and ping stats, post them,
    /// and install the peer list from the response.
    async fn update_once(&self, relay: &Relay, shutdown: bool) -> Result<()> {
        let (peer_stats, session_count) = {
            let state = relay.lock_state();
            (
                state.ping_manager.stats(relay.elapsed()),
                state.sessions.len() as u64,
            )
        };

        let snapshot = relay.stats.snapshot_and_reset();
        match serde_json::to_string(&snapshot) {
            Ok(json) => debug!(throughput = %json, "traffic snapshot"),
            Err(err) => debug!(error = %err, "could not serialize traffic snapshot"),
        }

        let body = write_update_request(&UpdateData {
            relay_address: &self.relay_address,
            relay_token: &self.relay_token,
            peer_stats: &peer_stats,
            session_count,
            bytes_sent: snapshot.bytes_sent,
            bytes_received: snapshot.bytes_received,
            shutdown,
        })?;

        let response = self.post(&self.update_url, body).await?;
        let peers = read_update_response(&response)?;

        {
            let now = relay.elapsed();
            let mut state = relay.lock_state();
            state.ping_manager.update(&peers, now);
        }
        Ok(())
    }

    /// The once-per-second update loop. Returns an error once the
    /// consecutive-failure limit is reached; returns cleanly on shutdown or
    /// after the drain protocol completes.
    pub async fn run(
        self,
        relay: Arc<Relay>,
        mut shutdown: watch::Receiver<bool>,
        mut drain: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(UPDATE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut failures = 0u32;
        let mut success_streak = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.update_once(&relay, false).await {
                        Ok(()) => {
                            success_streak += 1;
                            if success_streak >= UPDATE_SUCCESS_RESET {
                                failures = 0;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, failures, "could not update relay");
                            success_streak = 0;
                            failures += 1;
                            if failures >= UPDATE_FAILURE_LIMIT {
                                return Err(RelayError::Backend(
                                    "update failure limit reached".to_string(),
                                ));
                            }
                        }
                    }
                }
                _ = drain.changed() => {
                    self.notify_shutdown(&relay).await;
                    return Ok(());
                }
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    /// Clean-shutdown protocol: keep updating with the shutdown flag set
    /// until the backend acknowledges (or the attempt budget runs out), then
    /// give the control plane a grace period to route sessions away.
    async fn notify_shutdown(&self, relay: &Relay) {
        info!("notifying backend of shutdown");
        for _ in 0..DRAIN_ATTEMPTS {
            match self.update_once(relay, true).await {
                Ok(()) => {
                    info!(grace_secs = DRAIN_GRACE.as_secs(), "backend acknowledged shutdown");
                    tokio::time::sleep(DRAIN_GRACE).await;
                    return;
                }
                Err(err) => debug!(error = %err, "shutdown update failed"),
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        warn!("backend never acknowledged shutdown");
    }
}
