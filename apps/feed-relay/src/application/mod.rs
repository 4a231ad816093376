//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the relay interacts with the feed, downstream
//! clients, instrument metadata and journals.

/// Port interfaces for external systems (lookup, feed, clients, journals).
pub mod ports;

/// Application services for routing, subscriptions and shutdown.
pub mod services;
