//! Journal Records
//!
//! Flat JSON records appended to the per-category journals. A record is
//! either an annotated market event or a subscription outcome.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Journal a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogCategory {
    /// Market depth snapshots (1502).
    MarketDepth,
    /// Candle / bar updates (1505).
    Candle,
    /// Last traded price updates (1512).
    LastTradedPrice,
    /// Subscribe / unsubscribe outcomes.
    Subscriptions,
}

impl LogCategory {
    /// Every journal category.
    pub const ALL: [Self; 4] = [
        Self::MarketDepth,
        Self::Candle,
        Self::LastTradedPrice,
        Self::Subscriptions,
    ];

    /// File stem used for the journal of this category.
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::MarketDepth => "marketdepth",
            Self::Candle => "candle",
            Self::LastTradedPrice => "ltp",
            Self::Subscriptions => "sub_unsub",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// A single journal line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogRecord(Map<String, Value>);

impl LogRecord {
    /// Wrap a JSON object as a record.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Borrow a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow all fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into the underlying object.
    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for LogRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stems_are_distinct() {
        let mut stems: Vec<_> = LogCategory::ALL.iter().map(|c| c.file_stem()).collect();
        stems.sort_unstable();
        stems.dedup();
        assert_eq!(stems.len(), LogCategory::ALL.len());
    }

    #[test]
    fn record_serializes_as_flat_object() {
        let mut fields = Map::new();
        fields.insert("ExchangeInstrumentID".to_string(), Value::from(26000));
        fields.insert("name".to_string(), Value::from("NIFTY"));

        let json = serde_json::to_string(&LogRecord::new(fields)).unwrap();
        assert_eq!(json, r#"{"ExchangeInstrumentID":26000,"name":"NIFTY"}"#);
    }
}
