//! Domain Layer - Core relay types and business rules.
//!
//! This layer contains the instrument, market data, protocol and
//! subscription types used by the relay. Nothing here performs I/O.

/// Instrument descriptors, feed handles and the instrument directory.
pub mod instrument;

/// Journal record and category types.
pub mod journal;

/// Upstream market data events and their categories.
pub mod market_data;

/// Downstream client protocol (inbound commands, outbound messages).
pub mod protocol;

/// Subscription acknowledgments, failures and outcomes.
pub mod subscription;
