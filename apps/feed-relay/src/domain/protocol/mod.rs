//! Downstream Protocol
//!
//! JSON messages exchanged with downstream subscriber connections.
//!
//! # Inbound
//!
//! ```json
//! {"clientId": {"id": "terminal-7"}}
//! {"subscribe": {"list": [{"symbol": "NIFTY", "exchange": "NSE"}]}}
//! {"unsubscribe": {"list": [{"symbol": "NIFTY", "exchange": "NSE"}]}}
//! ```
//!
//! # Outbound
//!
//! ```json
//! {"message": {"type": "success", "name": "NIFTY", "operation": "Subscribe"}}
//! {"marketdata": [{"ExchangeInstrumentID": 26000, "Close": 19500.5, "name": "NIFTY"}]}
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::instrument::InstrumentRequest;
use super::market_data::AnnotatedEvent;

// =============================================================================
// Client Id
// =============================================================================

/// Identifier a downstream client declares for itself.
///
/// Accepts a JSON string or number; numbers are normalised to their
/// decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "client id must be a string or number, got {other}"
            ))),
        }
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Payload of a `clientId` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientIdPayload {
    /// Declared id.
    pub id: ClientId,
}

/// Payload of a `subscribe` / `unsubscribe` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstrumentList {
    /// Instruments to act on. Each entry decodes on its own.
    pub list: Vec<InstrumentRequest>,
}

/// Message received from a downstream client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InboundMessage {
    /// Register this connection under a client id.
    ClientId(ClientIdPayload),
    /// Subscribe to a list of instruments.
    Subscribe(InstrumentList),
    /// Unsubscribe from a list of instruments.
    Unsubscribe(InstrumentList),
}

impl InboundMessage {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON, an unknown key or a payload of
    /// the wrong shape.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ClientId(_) => "clientId",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
        }
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Message sent to a downstream client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OutboundMessage {
    /// Subscription outcome for the requesting client.
    #[serde(rename = "message")]
    Message(Map<String, Value>),
    /// Market data batch for every registered client.
    #[serde(rename = "marketdata")]
    MarketData(Vec<AnnotatedEvent>),
}

impl OutboundMessage {
    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
