//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Upstream feed stream client and subscription gateway.
pub mod feed;

/// Downstream WebSocket server.
pub mod downstream;

/// Instrument master lookup.
pub mod master;

/// JSON Lines file journals.
pub mod sink;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
