//! Instrument Lookup Port (Driven Port)
//!
//! Resolves client-supplied instrument descriptors into feed handles.

use async_trait::async_trait;

use crate::domain::instrument::{FeedInstrumentHandle, InstrumentDescriptor};

/// Errors resolving an instrument descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// No instrument matches the descriptor.
    #[error("instrument not found: {symbol} on {exchange}")]
    NotFound {
        /// Requested symbol.
        symbol: String,
        /// Requested exchange.
        exchange: String,
    },

    /// More than one instrument matches the descriptor.
    #[error("ambiguous instrument: {symbol} on {exchange} matches {count} instruments")]
    Ambiguous {
        /// Requested symbol.
        symbol: String,
        /// Requested exchange.
        exchange: String,
        /// Number of matches.
        count: usize,
    },

    /// The lookup source could not be reached.
    #[error("instrument lookup unavailable: {0}")]
    Unavailable(String),
}

/// Port for resolving instrument descriptors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstrumentLookupPort: Send + Sync {
    /// Resolve a descriptor into a feed handle.
    async fn resolve(
        &self,
        descriptor: &InstrumentDescriptor,
    ) -> Result<FeedInstrumentHandle, LookupError>;
}
