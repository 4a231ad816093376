//! Market Data Events
//!
//! Upstream feed events keyed by their broker message code. Payloads are
//! kept as ordered JSON objects so every field the feed sends is forwarded
//! and journaled unchanged; the relay only reads `ExchangeInstrumentID`.
//!
//! # Categories
//!
//! | Code | Category            | Journal | Broadcast |
//! |------|---------------------|---------|-----------|
//! | 1501 | Touchline           | -       | -         |
//! | 1502 | Market depth        | yes     | -         |
//! | 1505 | Candle              | yes     | yes       |
//! | 1507 | Market status       | -       | -         |
//! | 1510 | Open interest       | -       | -         |
//! | 1512 | Last traded price   | yes     | yes       |
//! | 1105 | Instrument change   | -       | -         |

use serde::Serialize;
use serde_json::{Map, Value};

use super::instrument::FeedInstrumentId;
use super::journal::{LogCategory, LogRecord};

/// Payload field carrying the feed instrument id.
pub const INSTRUMENT_ID_FIELD: &str = "ExchangeInstrumentID";

/// Field added to annotated events.
pub const NAME_FIELD: &str = "name";

// =============================================================================
// Event Category
// =============================================================================

/// Broker message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Best bid/ask touchline (1501).
    Touchline,
    /// Market depth snapshot (1502).
    MarketDepth,
    /// Candle / bar update (1505).
    Candle,
    /// Exchange market status (1507).
    MarketStatus,
    /// Open interest (1510).
    OpenInterest,
    /// Last traded price (1512).
    LastTradedPrice,
    /// Instrument property change (1105).
    InstrumentChange,
}

impl EventCategory {
    /// Parse a broker message code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1501 => Some(Self::Touchline),
            1502 => Some(Self::MarketDepth),
            1505 => Some(Self::Candle),
            1507 => Some(Self::MarketStatus),
            1510 => Some(Self::OpenInterest),
            1512 => Some(Self::LastTradedPrice),
            1105 => Some(Self::InstrumentChange),
            _ => None,
        }
    }

    /// Parse a Socket.IO event name such as `1505-json-full`.
    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        let code = name.split('-').next()?.parse::<u16>().ok()?;
        Self::from_code(code)
    }

    /// Broker message code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Touchline => 1501,
            Self::MarketDepth => 1502,
            Self::Candle => 1505,
            Self::MarketStatus => 1507,
            Self::OpenInterest => 1510,
            Self::LastTradedPrice => 1512,
            Self::InstrumentChange => 1105,
        }
    }

    /// Journal the category is written to, if it is routed at all.
    #[must_use]
    pub const fn journal(self) -> Option<LogCategory> {
        match self {
            Self::MarketDepth => Some(LogCategory::MarketDepth),
            Self::Candle => Some(LogCategory::Candle),
            Self::LastTradedPrice => Some(LogCategory::LastTradedPrice),
            _ => None,
        }
    }

    /// Whether events of this category are pushed to downstream clients.
    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        matches!(self, Self::Candle | Self::LastTradedPrice)
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Touchline => "touchline",
            Self::MarketDepth => "market_depth",
            Self::Candle => "candle",
            Self::MarketStatus => "market_status",
            Self::OpenInterest => "open_interest",
            Self::LastTradedPrice => "ltp",
            Self::InstrumentChange => "instrument_change",
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Errors decoding an upstream event payload.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    /// Payload is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object.
    #[error("expected JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A decoded upstream event.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    category: EventCategory,
    fields: Map<String, Value>,
}

impl MarketEvent {
    /// Decode a JSON text payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object.
    pub fn decode(category: EventCategory, payload: &str) -> Result<Self, EventDecodeError> {
        let value: Value = serde_json::from_str(payload)?;
        Self::from_value(category, value)
    }

    /// Build an event from an already-parsed value.
    ///
    /// The feed publishes JSON payloads as strings; a string value is
    /// decoded once more before being checked.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not (or does not contain) a JSON object.
    pub fn from_value(category: EventCategory, value: Value) -> Result<Self, EventDecodeError> {
        match value {
            Value::Object(fields) => Ok(Self { category, fields }),
            Value::String(text) => Self::decode(category, &text),
            other => Err(EventDecodeError::NotAnObject(json_kind(&other))),
        }
    }

    /// Event category.
    #[must_use]
    pub const fn category(&self) -> EventCategory {
        self.category
    }

    /// Raw payload fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Feed instrument id, accepting a number or a numeric string.
    #[must_use]
    pub fn instrument_id(&self) -> Option<FeedInstrumentId> {
        match self.fields.get(INSTRUMENT_ID_FIELD)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Attach a display name. A missing name is written as `null`.
    #[must_use]
    pub fn annotate(self, name: Option<String>) -> AnnotatedEvent {
        let mut fields = self.fields;
        fields.insert(NAME_FIELD.to_string(), name.map_or(Value::Null, Value::String));
        AnnotatedEvent {
            category: self.category,
            fields,
        }
    }
}

/// An upstream event enriched with its display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedEvent {
    #[serde(skip)]
    category: EventCategory,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl AnnotatedEvent {
    /// Event category.
    #[must_use]
    pub const fn category(&self) -> EventCategory {
        self.category
    }

    /// Annotated name, if the directory had one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get(NAME_FIELD).and_then(Value::as_str)
    }

    /// All fields including the annotation.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Journal copy of this event.
    #[must_use]
    pub fn to_record(&self) -> LogRecord {
        LogRecord::new(self.fields.clone())
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Tests
// =============================================================================
