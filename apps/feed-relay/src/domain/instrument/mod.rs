//! Instrument Types
//!
//! Client-facing instrument descriptors, the feed-level handles they
//! resolve to, and the directory that maps feed instrument ids back to
//! display names for event annotation.
//!
//! # Lifecycle
//!
//! - A directory entry is created when the feed acknowledges a subscribe
//! - It is removed when the feed acknowledges an unsubscribe
//! - Events for ids without an entry are annotated with no name

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Types
// =============================================================================

/// Numeric instrument identifier assigned by the feed.
pub type FeedInstrumentId = u64;

/// Instrument identity as supplied by a downstream client.
///
/// # Wire Format (JSON)
/// ```json
/// {"symbol": "NIFTY", "exchange": "NSE"}
/// {"symbol": "NIFTY", "exchange": "NSEFO", "expiry": "2024-01-25", "strike": 21500, "optionType": "CE"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentDescriptor {
    /// Trading symbol (e.g. "NIFTY", "RELIANCE").
    pub symbol: String,

    /// Exchange or exchange segment (e.g. "NSE", "NSECM", "NSEFO").
    pub exchange: String,

    /// Series (e.g. "EQ", "OPTIDX").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,

    /// Contract expiry for derivatives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,

    /// Strike price for options. Accepts a number or a numeric string.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_number"
    )]
    pub strike: Option<f64>,

    /// Option type ("CE" / "PE").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_type: Option<String>,

    /// Any additional fields the client sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InstrumentDescriptor {
    /// Create a descriptor for a cash/index instrument.
    #[must_use]
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            series: None,
            expiry: None,
            strike: None,
            option_type: None,
            extra: Map::new(),
        }
    }

    /// Whether this descriptor identifies a dated contract.
    #[must_use]
    pub const fn is_derivative(&self) -> bool {
        self.expiry.is_some()
    }
}

/// One entry of a client's instrument list.
///
/// Entries decode independently: an entry that is not a valid descriptor
/// becomes `Invalid` instead of rejecting the whole list.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentRequest {
    /// A well-formed descriptor.
    Descriptor(InstrumentDescriptor),
    /// An entry that could not be decoded.
    Invalid {
        /// The entry's `symbol`, if it had a textual one.
        name: String,
        /// Decode error.
        reason: String,
    },
}

impl InstrumentRequest {
    /// Decode one list entry.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let name = value
            .get("symbol")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value(value) {
            Ok(descriptor) => Self::Descriptor(descriptor),
            Err(e) => Self::Invalid {
                name,
                reason: e.to_string(),
            },
        }
    }

    /// Symbol of the entry.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Descriptor(descriptor) => &descriptor.symbol,
            Self::Invalid { name, .. } => name,
        }
    }
}

impl From<InstrumentDescriptor> for InstrumentRequest {
    fn from(descriptor: InstrumentDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }
}

impl<'de> Deserialize<'de> for InstrumentRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Resolved feed-level identity of an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedInstrumentHandle {
    /// Numeric exchange segment (1 = NSECM, 2 = NSEFO, ...).
    pub exchange_segment: u32,

    /// Feed instrument id.
    #[serde(rename = "exchangeInstrumentID")]
    pub exchange_instrument_id: FeedInstrumentId,

    /// Instrument type reported by the instrument master.
    pub instrument_type: String,

    /// Display name used to annotate events.
    pub name: String,
}

// =============================================================================
// Instrument Directory
// =============================================================================

/// Maps feed instrument ids to display names.
///
/// Shared between the subscription service (writer) and the event
/// router (reader). Missing entries resolve to `None`, never an error.
#[derive(Debug, Default)]
pub struct InstrumentDirectory {
    names: RwLock<HashMap<FeedInstrumentId, String>>,
}

impl InstrumentDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the display name for an id.
    pub fn set(&self, id: FeedInstrumentId, name: impl Into<String>) {
        self.names.write().insert(id, name.into());
    }

    /// Look up the display name for an id.
    #[must_use]
    pub fn get(&self, id: FeedInstrumentId) -> Option<String> {
        self.names.read().get(&id).cloned()
    }

    /// Remove the entry for an id, returning the name if one existed.
    pub fn remove(&self, id: FeedInstrumentId) -> Option<String> {
        self.names.write().remove(&id)
    }

    /// Whether an entry exists for an id.
    #[must_use]
    pub fn contains(&self, id: FeedInstrumentId) -> bool {
        self.names.read().contains_key(&id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Tests
// =============================================================================
