//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Feed**: Events received per category, malformed events, connection state
//! - **Clients**: Registered clients, broadcasts, failed sends
//! - **Subscriptions**: Outcomes per operation and result, directory size
//! - **Journals**: Failed writes
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::{BroadcastReport, RouteOutcome};
use crate::domain::market_data::EventCategory;
use crate::domain::subscription::SubscriptionOutcome;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Errors installing the metrics recorder.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The Prometheus recorder could not be installed.
    #[error("failed to install Prometheus recorder: {0}")]
    Install(String),
}

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle from the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "feed_relay_events_received_total",
        "Total events received from the upstream feed"
    );
    describe_counter!(
        "feed_relay_events_malformed_total",
        "Total upstream events dropped as malformed"
    );
    describe_counter!(
        "feed_relay_broadcasts_total",
        "Total market data broadcasts to downstream clients"
    );
    describe_counter!(
        "feed_relay_client_send_failures_total",
        "Total failed sends to downstream clients"
    );
    describe_counter!(
        "feed_relay_subscription_outcomes_total",
        "Total subscription outcomes by operation and result"
    );
    describe_counter!(
        "feed_relay_journal_write_failures_total",
        "Total failed journal writes"
    );
    describe_counter!(
        "feed_relay_feed_reconnects_total",
        "Total upstream feed reconnection attempts"
    );

    describe_gauge!(
        "feed_relay_clients_registered",
        "Number of registered downstream clients"
    );
    describe_gauge!(
        "feed_relay_directory_entries",
        "Number of instruments in the directory"
    );
    describe_gauge!(
        "feed_relay_feed_connected",
        "Whether the upstream feed is connected (1) or not (0)"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an event received from the feed and how it was routed.
pub fn record_event(category: EventCategory, outcome: RouteOutcome) {
    counter!(
        "feed_relay_events_received_total",
        "category" => category.as_str()
    )
    .increment(1);

    match outcome {
        RouteOutcome::Malformed => {
            counter!(
                "feed_relay_events_malformed_total",
                "category" => category.as_str()
            )
            .increment(1);
        }
        RouteOutcome::Routed {
            journaled,
            broadcast,
        } => {
            if !journaled {
                record_journal_failure(category.as_str());
            }
            if let Some(report) = broadcast {
                record_broadcast(category, report);
            }
        }
        RouteOutcome::Ignored => {}
    }
}

/// Record a broadcast and its failed sends.
pub fn record_broadcast(category: EventCategory, report: BroadcastReport) {
    counter!(
        "feed_relay_broadcasts_total",
        "category" => category.as_str()
    )
    .increment(1);

    if report.failed > 0 {
        counter!("feed_relay_client_send_failures_total").increment(report.failed as u64);
    }
}

/// Record subscription outcomes.
pub fn record_subscription_outcomes(outcomes: &[SubscriptionOutcome]) {
    for outcome in outcomes {
        counter!(
            "feed_relay_subscription_outcomes_total",
            "operation" => outcome.operation.as_str(),
            "result" => if outcome.is_success() { "success" } else { "failure" }
        )
        .increment(1);
    }
}

/// Record a failed journal write.
pub fn record_journal_failure(journal: &'static str) {
    counter!(
        "feed_relay_journal_write_failures_total",
        "journal" => journal
    )
    .increment(1);
}

/// Record a feed reconnection attempt.
pub fn record_reconnect() {
    counter!("feed_relay_feed_reconnects_total").increment(1);
}

/// Update the registered client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_clients_registered(count: usize) {
    gauge!("feed_relay_clients_registered").set(count as f64);
}

/// Update the directory size.
#[allow(clippy::cast_precision_loss)]
pub fn set_directory_entries(count: usize) {
    gauge!("feed_relay_directory_entries").set(count as f64);
}

/// Update the feed connection state.
pub fn set_feed_connected(connected: bool) {
    gauge!("feed_relay_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
