#![forbid(unsafe_code)]

use std::sync::Arc;

use hoplink_relay_lib::backend::BackendClient;
use hoplink_relay_lib::config::Config;
use hoplink_relay_lib::relay::{Relay, RouterClock};
use hoplink_relay_lib::udp::{self, PacketProcessor};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    // a nonzero RELAY_DEBUG silences the verbose output
    let default_filter = if config.debug != 0 { "info" } else { "debug" };

    if let Some(path) = &config.log_file {
        match std::fs::File::create(path) {
            Ok(file) => {
                let filter = EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_filter));
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .init();
                return;
            }
            Err(err) => {
                eprintln!("could not open {path} ({err}), logging to stdout");
            }
        }
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };

    init_tracing(&config);

    info!(
        address = %config.relay_address,
        backend = %config.backend_hostname,
        "hoplink relay starting"
    );

    let socket = match udp::bind_socket(&config.relay_address) {
        Ok(socket) => Arc::new(socket),
        Err(err) => {
            error!(error = %err, "could not create socket");
            return 1;
        }
    };
    info!(port = config.relay_address.port, "relay socket opened");

    let mut backend = match BackendClient::new(&config) {
        Ok(backend) => backend,
        Err(err) => {
            error!(error = %err, "could not create backend client");
            return 1;
        }
    };

    info!("initializing relay");
    let router_timestamp = match backend.initialize().await {
        Ok(timestamp) => timestamp,
        Err(err) => {
            error!(error = %err, "could not initialize relay");
            return 1;
        }
    };

    let relay = Arc::new(Relay::new(
        socket,
        &config,
        RouterClock::new(router_timestamp),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (drain_tx, drain_rx) = watch::channel(false);

    let receiver_task = tokio::spawn(
        PacketProcessor::new(relay.clone()).run(shutdown_rx.clone()),
    );
    let pinger_task = tokio::spawn(udp::pinger::run(relay.clone(), shutdown_rx.clone()));
    let mut backend_task = tokio::spawn(backend.run(relay.clone(), shutdown_rx, drain_rx));

    info!("relay initialized");

    let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
        error!("could not install signal handler");
        return 1;
    };
    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        error!("could not install signal handler");
        return 1;
    };
    let Ok(mut hangup) = signal(SignalKind::hangup()) else {
        error!("could not install signal handler");
        return 1;
    };

    enum Outcome {
        Quit,
        Drain,
        BackendFinished(Result<hoplink_relay_lib::Result<()>, tokio::task::JoinError>),
    }

    let outcome = tokio::select! {
        _ = interrupt.recv() => {
            info!("received interrupt, shutting down");
            Outcome::Quit
        }
        _ = terminate.recv() => {
            info!("received terminate, shutting down");
            Outcome::Quit
        }
        _ = hangup.recv() => {
            info!("received hangup, starting clean shutdown");
            Outcome::Drain
        }
        result = &mut backend_task => Outcome::BackendFinished(result),
    };

    let exit_code = match outcome {
        Outcome::Quit => 0,
        Outcome::Drain => {
            let _ = drain_tx.send(true);
            match backend_task.await {
                Ok(Ok(())) => 0,
                Ok(Err(err)) => {
                    error!(error = %err, "clean shutdown failed");
                    1
                }
                Err(err) => {
                    error!(error = %err, "backend task failed");
                    1
                }
            }
        }
        Outcome::BackendFinished(result) => match result {
            Ok(Ok(())) => 0,
            Ok(Err(err)) => {
                error!(error = %err, "could not update relay");
                1
            }
            Err(err) => {
                error!(error = %err, "backend task failed");
                1
            }
        },
    };

    info!("cleaning up");
    let _ = shutdown_tx.send(true);
    let _ = receiver_task.await;
    let _ = pinger_task.await;

    let resident_sessions = relay.lock_state().sessions.len();
    info!(sessions = resident_sessions, "relay stopped");

    exit_code
}
