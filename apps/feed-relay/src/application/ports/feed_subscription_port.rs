//! Feed Subscription Port (Driven Port)
//!
//! Issues subscribe and unsubscribe requests to the upstream feed.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::instrument::FeedInstrumentHandle;

/// Errors from the upstream subscription endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedRequestError {
    /// The feed answered but did not acknowledge the request.
    #[error("feed rejected request: {description}")]
    Rejected {
        /// Response `type` (e.g. "error").
        kind: String,
        /// Response `code`, if present.
        code: Option<String>,
        /// Response `description`.
        description: String,
    },

    /// The request could not be delivered.
    #[error("feed request failed: {0}")]
    Transport(String),

    /// The response body could not be understood.
    #[error("invalid feed response: {0}")]
    InvalidResponse(String),
}

impl FeedRequestError {
    /// Failure type reported to clients.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Rejected { kind, .. } => kind,
            Self::Transport(_) | Self::InvalidResponse(_) => "error",
        }
    }

    /// Failure code reported to clients.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Rejected { code, .. } => code.clone(),
            Self::Transport(_) => Some("TRANSPORT".to_string()),
            Self::InvalidResponse(_) => Some("INVALID_RESPONSE".to_string()),
        }
    }

    /// Failure description reported to clients.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Rejected { description, .. } => description.clone(),
            Self::Transport(msg) | Self::InvalidResponse(msg) => msg.clone(),
        }
    }
}

/// Port for upstream subscription requests.
///
/// A successful call returns the feed's acknowledgment body.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSubscriptionPort: Send + Sync {
    /// Subscribe to events for an instrument.
    async fn subscribe(
        &self,
        handle: &FeedInstrumentHandle,
    ) -> Result<Map<String, Value>, FeedRequestError>;

    /// Unsubscribe from events for an instrument.
    async fn unsubscribe(
        &self,
        handle: &FeedInstrumentHandle,
    ) -> Result<Map<String, Value>, FeedRequestError>;
}
