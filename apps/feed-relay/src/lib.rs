#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Feed Relay - Market Data Fan-out
//!
//! Maintains a single Socket.IO connection to a broker's market data feed,
//! annotates each event with the instrument's display name, journals it to
//! disk and fans it out to every connected WebSocket client.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `instrument`: Descriptors, feed handles, the instrument directory
//!   - `market_data`: Upstream event categories and payloads
//!   - `subscription`: Subscribe/unsubscribe outcomes
//!   - `protocol`: Downstream JSON messages
//!   - `journal`: Journal categories and records
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Lookup, feed subscription, client connection, record sink
//!   - `services`: Subscription manager, client registry, event router,
//!     lifecycle controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Socket.IO stream client and REST subscription gateway
//!   - `downstream`: axum WebSocket server
//!   - `master`: Instrument master file lookup
//!   - `sink`: JSON Lines journals
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                        ┌──────────────┐     ┌──────────────┐
//! Broker feed (WS) ────► │ Event Router │ ──► │   Registry   │ ──► Client 1..N
//!                        └──────┬───────┘     └──────────────┘
//!                               ▼
//!                        category journals
//!
//! Client ── subscribe ──► Subscription Service ──► Broker REST
//!                               │
//!                               ▼
//!                     Directory + sub_unsub journal
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::instrument::{
    FeedInstrumentHandle, FeedInstrumentId, InstrumentDescriptor, InstrumentDirectory,
    InstrumentRequest,
};
pub use domain::journal::{LogCategory, LogRecord};
pub use domain::market_data::{AnnotatedEvent, EventCategory, MarketEvent};
pub use domain::protocol::{ClientId, InboundMessage, OutboundMessage};
pub use domain::subscription::{Operation, SubscriptionOutcome};

// Ports and services
pub use application::ports::{
    ClientConnectionPort, FeedRequestError, FeedSubscriptionPort, InstrumentLookupPort,
    LookupError, MemorySink, RecordSinkPort, SinkError, SinkSet,
};
pub use application::services::{
    ClientRegistry, EventRouter, LifecycleController, ShutdownOutcome, ShutdownStatus,
    ShutdownTrigger, SubscriptionService,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, RelayConfig, WebSocketSettings};

// Adapters
pub use infrastructure::downstream::{DownstreamServer, DownstreamServerError, DownstreamState};
pub use infrastructure::feed::{
    FeedEvent, FeedState, FeedStreamClient, FeedStreamConfig, FeedStreamError, HttpFeedGateway,
};
pub use infrastructure::master::InstrumentMaster;
pub use infrastructure::sink::{FileSink, open_file_sinks};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
