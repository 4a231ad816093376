//! Feed Relay Binary
//!
//! Starts the market data relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin feed-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FEED_TOKEN`: Market data API token
//! - `FEED_USER_ID`: Market data API user id
//!
//! ## Optional
//! - `FEED_BASE_URL`: Broker API base URL (default: <https://mtrade.arhamshare.com>)
//! - `FEED_MESSAGE_CODES`: Codes to subscribe per instrument (default: 1502,1505,1512)
//! - `RELAY_WS_PORT`: Downstream WebSocket port (default: 8085)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `RELAY_INSTRUMENT_MASTER_PATH`: Instrument master JSON (default: ./instruments.json)
//! - `RELAY_LOG_DIR`: Journal root directory (default: ./logs)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log filter (default: `feed_relay=info`)
//!
//! # Signals
//!
//! - Ctrl+C / SIGTERM: flush journals and exit 0
//! - SIGUSR2: flush journals and exit 0 for the supervisor to restart
//! - Critical task failure: flush journals and exit 1

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use feed_relay::application::services::{
    ClientRegistry, EventRouter, LifecycleController, ShutdownTrigger, SubscriptionService,
};
use feed_relay::domain::instrument::InstrumentDirectory;
use feed_relay::infrastructure::downstream::{DownstreamServer, DownstreamState};
use feed_relay::infrastructure::feed::{
    ConnectionState, FeedEvent, FeedState, FeedStreamClient, FeedStreamConfig, HeartbeatConfig,
    HttpFeedGateway, ReconnectConfig,
};
use feed_relay::infrastructure::health::{HealthServer, HealthServerState};
use feed_relay::infrastructure::master::InstrumentMaster;
use feed_relay::infrastructure::{metrics, sink, telemetry};
use feed_relay::{RelayConfig, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Time allowed for in-flight feed events to drain before journals close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Feed event queue depth.
const FEED_EVENT_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Feed Relay");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let config = RelayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let (fault_tx, fault_rx) = mpsc::channel::<String>(4);

    // Shared state
    let directory = Arc::new(InstrumentDirectory::new());
    let registry = Arc::new(ClientRegistry::new());
    let feed_state = Arc::new(FeedState::new());

    // Journals
    let today = chrono::Local::now().date_naive();
    let sinks = sink::open_file_sinks(&config.journal.log_dir, today)
        .await
        .context("failed to open journals")?;
    let lifecycle = LifecycleController::new(config.journal.close_timeout);
    lifecycle.install(&sinks);

    // Upstream adapters
    let master = InstrumentMaster::load(&config.instrument_master_path)
        .context("failed to load instrument master")?;
    let gateway =
        HttpFeedGateway::from_config(&config).context("failed to build subscription client")?;

    // Services
    let subscriptions = Arc::new(SubscriptionService::new(
        Arc::new(master),
        Arc::new(gateway),
        Arc::clone(&directory),
        Arc::clone(&sinks.subscriptions),
    ));
    let router = EventRouter::new(Arc::clone(&directory), Arc::clone(&registry), sinks);

    // Feed stream
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(FEED_EVENT_CAPACITY);
    let feed_config = FeedStreamConfig {
        url: config.feed_stream_url()?,
        reconnect: ReconnectConfig::from_websocket_settings(&config.websocket),
        heartbeat: HeartbeatConfig::from_websocket_settings(&config.websocket),
    };
    let feed_client = Arc::new(FeedStreamClient::new(
        feed_config,
        feed_tx,
        shutdown_token.clone(),
    ));

    let handler_state = Arc::clone(&feed_state);
    let feed_handler = tokio::spawn(async move {
        handle_feed_events(feed_rx, router, handler_state).await;
    });

    spawn_critical("feed stream", fault_tx.clone(), async move {
        feed_client.run().await
    });

    // Downstream server
    let ws_addr = socket_addr(&config.server.bind_address, config.server.ws_port)?;
    let downstream_state = Arc::new(DownstreamState::new(
        Arc::clone(&registry),
        subscriptions,
        Arc::clone(&directory),
        config.clients.queue_capacity,
        shutdown_token.clone(),
    ));
    let downstream = DownstreamServer::new(ws_addr, downstream_state, shutdown_token.clone());
    spawn_critical("downstream server", fault_tx, downstream.run());

    // Health server
    let health_addr = socket_addr(&config.server.bind_address, config.server.health_port)?;
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&feed_state),
        Arc::clone(&registry),
        Arc::clone(&directory),
    ));
    let health_server = HealthServer::new(health_addr, health_state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Feed relay ready");

    let trigger = await_shutdown(fault_rx).await;
    shutdown_token.cancel();
    tracing::info!(trigger = %trigger, "Graceful shutdown started");

    if tokio::time::timeout(DRAIN_TIMEOUT, feed_handler).await.is_err() {
        tracing::warn!(
            timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "Feed events still pending at shutdown"
        );
    }

    let outcome = lifecycle.shutdown(trigger).await;
    tracing::info!(
        trigger = %outcome.trigger,
        status = ?outcome.status,
        exit_code = outcome.exit_code(),
        "Feed relay stopped"
    );
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Handle events from the feed stream client.
async fn handle_feed_events(
    mut rx: mpsc::Receiver<FeedEvent>,
    router: EventRouter,
    feed_state: Arc<FeedState>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Connected => {
                feed_state.set_state(ConnectionState::Connected);
                metrics::set_feed_connected(true);
                tracing::info!("Feed connected");
            }
            FeedEvent::Disconnected => {
                feed_state.set_state(ConnectionState::Disconnected);
                metrics::set_feed_connected(false);
                tracing::warn!("Feed disconnected");
            }
            FeedEvent::Reconnecting { attempt } => {
                feed_state.set_reconnecting(attempt);
                metrics::record_reconnect();
                tracing::info!(attempt, "Feed reconnecting");
            }
            FeedEvent::Market { category, payload } => {
                feed_state.increment_events();
                let outcome = router.route_value(category, payload);
                metrics::record_event(category, outcome);
            }
            FeedEvent::Error(msg) => {
                feed_state.set_error(msg.clone());
                tracing::error!(error = %msg, "Feed error");
            }
        }
    }
}

/// Spawn a task whose failure shuts the relay down.
fn spawn_critical<F, E>(name: &'static str, fault_tx: mpsc::Sender<String>, task: F)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send,
{
    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Critical task failed");
            let _ = fault_tx.send(format!("{name}: {e}")).await;
        }
    });
}

fn socket_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        base_url = %config.feed.base_url,
        message_codes = ?config.feed.message_codes,
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        log_dir = %config.journal.log_dir.display(),
        instrument_master = %config.instrument_master_path.display(),
        "Configuration loaded"
    );
    tracing::debug!(
        subscription_url = %config.subscription_url(),
        "Feed endpoints"
    );
}

/// Wait for a shutdown signal or a critical task failure.
#[allow(clippy::expect_used)]
async fn await_shutdown(mut fault_rx: mpsc::Receiver<String>) -> ShutdownTrigger {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let (terminate, restart) = {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown");
        let mut restart = signal::unix::signal(signal::unix::SignalKind::user_defined2())
            .expect("SIGUSR2 handler installation is critical for graceful shutdown");
        (
            async move {
                terminate.recv().await;
            },
            async move {
                restart.recv().await;
            },
        )
    };

    #[cfg(not(unix))]
    let (terminate, restart) = (std::future::pending::<()>(), std::future::pending::<()>());

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
            ShutdownTrigger::Interrupt
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
            ShutdownTrigger::Terminate
        }
        () = restart => {
            tracing::info!("Received SIGUSR2, shutting down for restart");
            ShutdownTrigger::Restart
        }
        Some(reason) = fault_rx.recv() => {
            tracing::error!(reason = %reason, "Critical failure, initiating shutdown");
            ShutdownTrigger::Fault
        }
    }
}
