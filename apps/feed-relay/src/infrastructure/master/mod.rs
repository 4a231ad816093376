//! Instrument Master
//!
//! Resolves client descriptors against an instrument master file loaded
//! at startup. The file is a JSON array of entries:
//!
//! ```json
//! [
//!   {"exchange": "NSECM", "exchangeSegment": 1, "exchangeInstrumentID": 26000,
//!    "instrumentType": "INDEX", "symbol": "NIFTY", "series": "INDEX"},
//!   {"exchange": "NSEFO", "exchangeSegment": 2, "exchangeInstrumentID": 35012,
//!    "instrumentType": "OPTIDX", "symbol": "NIFTY", "series": "OPTIDX",
//!    "expiry": "2024-01-25", "strike": 21500, "optionType": "CE",
//!    "name": "NIFTY 25JAN 21500 CE"}
//! ]
//! ```
//!
//! # Matching
//!
//! - Symbol matches case-insensitively
//! - Exchange matches exactly or as a prefix ("NSE" matches "NSECM" and "NSEFO")
//! - Series, expiry, strike and option type are compared only when the
//!   descriptor carries them
//! - A descriptor without an expiry never matches a dated contract
//!
//! Exactly one match resolves; none is `NotFound`, several is `Ambiguous`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{InstrumentLookupPort, LookupError};
use crate::domain::instrument::{FeedInstrumentHandle, FeedInstrumentId, InstrumentDescriptor};

const STRIKE_TOLERANCE: f64 = 1e-6;

/// Errors loading the instrument master.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    /// File could not be read.
    #[error("failed to read instrument master {path}: {source}")]
    Io {
        /// Master file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid master.
    #[error("failed to parse instrument master {path}: {source}")]
    Parse {
        /// Master file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// One instrument master row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterEntry {
    /// Exchange segment name (e.g. "NSECM").
    pub exchange: String,
    /// Numeric exchange segment.
    pub exchange_segment: u32,
    /// Feed instrument id.
    #[serde(rename = "exchangeInstrumentID")]
    pub exchange_instrument_id: FeedInstrumentId,
    /// Instrument type.
    pub instrument_type: String,
    /// Trading symbol.
    pub symbol: String,
    /// Series.
    #[serde(default)]
    pub series: Option<String>,
    /// Contract expiry.
    #[serde(default)]
    pub expiry: Option<String>,
    /// Strike price.
    #[serde(default)]
    pub strike: Option<f64>,
    /// Option type.
    #[serde(default)]
    pub option_type: Option<String>,
    /// Display name; defaults to the symbol.
    #[serde(default)]
    pub name: Option<String>,
}

impl MasterEntry {
    fn matches(&self, descriptor: &InstrumentDescriptor) -> bool {
        let exchange = &descriptor.exchange;
        let exchange_matches = self.exchange.eq_ignore_ascii_case(exchange)
            || self
                .exchange
                .get(..exchange.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(exchange));
        if !exchange_matches {
            return false;
        }

        if descriptor.expiry.is_none() && self.expiry.is_some() {
            return false;
        }

        optional_eq(descriptor.series.as_deref(), self.series.as_deref())
            && optional_eq(descriptor.expiry.as_deref(), self.expiry.as_deref())
            && optional_eq(descriptor.option_type.as_deref(), self.option_type.as_deref())
            && descriptor.strike.is_none_or(|strike| {
                self.strike
                    .is_some_and(|own| (own - strike).abs() < STRIKE_TOLERANCE)
            })
    }

    fn to_handle(&self) -> FeedInstrumentHandle {
        FeedInstrumentHandle {
            exchange_segment: self.exchange_segment,
            exchange_instrument_id: self.exchange_instrument_id,
            instrument_type: self.instrument_type.clone(),
            name: self.name.clone().unwrap_or_else(|| self.symbol.clone()),
        }
    }
}

fn optional_eq(wanted: Option<&str>, have: Option<&str>) -> bool {
    match (wanted, have) {
        (None, _) => true,
        (Some(wanted), Some(have)) => wanted.eq_ignore_ascii_case(have),
        (Some(_), None) => false,
    }
}

/// In-memory instrument master indexed by symbol.
#[derive(Debug, Default)]
pub struct InstrumentMaster {
    by_symbol: HashMap<String, Vec<MasterEntry>>,
    len: usize,
}

impl InstrumentMaster {
    /// Build a master from entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = MasterEntry>) -> Self {
        let mut by_symbol: HashMap<String, Vec<MasterEntry>> = HashMap::new();
        let mut len = 0;
        for entry in entries {
            by_symbol
                .entry(entry.symbol.to_ascii_uppercase())
                .or_default()
                .push(entry);
            len += 1;
        }
        Self { by_symbol, len }
    }

    /// Load a master file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, MasterError> {
        let text = std::fs::read_to_string(path).map_err(|source| MasterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<MasterEntry> =
            serde_json::from_str(&text).map_err(|source| MasterError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let master = Self::from_entries(entries);
        tracing::info!(path = %path.display(), instruments = master.len(), "Instrument master loaded");
        Ok(master)
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the master is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolve a descriptor to a feed handle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Ambiguous` when the descriptor does not match
    /// exactly one entry.
    pub fn find(&self, descriptor: &InstrumentDescriptor) -> Result<FeedInstrumentHandle, LookupError> {
        let not_found = || LookupError::NotFound {
            symbol: descriptor.symbol.clone(),
            exchange: descriptor.exchange.clone(),
        };

        let candidates = self
            .by_symbol
            .get(&descriptor.symbol.to_ascii_uppercase())
            .ok_or_else(not_found)?;

        let mut matches = candidates.iter().filter(|entry| entry.matches(descriptor));
        let first = matches.next().ok_or_else(not_found)?;
        let extra = matches.count();
        if extra > 0 {
            return Err(LookupError::Ambiguous {
                symbol: descriptor.symbol.clone(),
                exchange: descriptor.exchange.clone(),
                count: extra + 1,
            });
        }
        Ok(first.to_handle())
    }
}

#[async_trait]
impl InstrumentLookupPort for InstrumentMaster {
    async fn resolve(
        &self,
        descriptor: &InstrumentDescriptor,
    ) -> Result<FeedInstrumentHandle, LookupError> {
        self.find(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MASTER: &str = r#"[
        {"exchange":"NSECM","exchangeSegment":1,"exchangeInstrumentID":26000,"instrumentType":"INDEX","symbol":"NIFTY","series":"INDEX"},
        {"exchange":"NSECM","exchangeSegment":1,"exchangeInstrumentID":2885,"instrumentType":"EQ","symbol":"RELIANCE","series":"EQ"},
        {"exchange":"BSECM","exchangeSegment":11,"exchangeInstrumentID":500325,"instrumentType":"EQ","symbol":"RELIANCE","series":"A"},
        {"exchange":"NSEFO","exchangeSegment":2,"exchangeInstrumentID":35012,"instrumentType":"OPTIDX","symbol":"NIFTY","series":"OPTIDX","expiry":"2024-01-25","strike":21500,"optionType":"CE","name":"NIFTY 25JAN 21500 CE"},
        {"exchange":"NSEFO","exchangeSegment":2,"exchangeInstrumentID":35013,"instrumentType":"OPTIDX","symbol":"NIFTY","series":"OPTIDX","expiry":"2024-01-25","strike":21500,"optionType":"PE","name":"NIFTY 25JAN 21500 PE"}
    ]"#;

    fn master() -> InstrumentMaster {
        InstrumentMaster::from_entries(serde_json::from_str::<Vec<MasterEntry>>(MASTER).unwrap())
    }

    fn option(option_type: Option<&str>) -> InstrumentDescriptor {
        let mut desc = InstrumentDescriptor::new("NIFTY", "NSEFO");
        desc.expiry = Some("2024-01-25".to_string());
        desc.strike = Some(21500.0);
        desc.option_type = option_type.map(str::to_string);
        desc
    }

    #[test]
    fn resolves_index_by_exchange_prefix() {
        let handle = master().find(&InstrumentDescriptor::new("nifty", "NSE")).unwrap();

        assert_eq!(handle.exchange_instrument_id, 26000);
        assert_eq!(handle.exchange_segment, 1);
        assert_eq!(handle.name, "NIFTY");
    }

    #[test]
    fn resolves_option_with_display_name() {
        let handle = master().find(&option(Some("CE"))).unwrap();

        assert_eq!(handle.exchange_instrument_id, 35012);
        assert_eq!(handle.name, "NIFTY 25JAN 21500 CE");
    }

    #[test]
    fn underspecified_option_is_ambiguous() {
        let err = master().find(&option(None)).unwrap_err();
        assert!(matches!(err, LookupError::Ambiguous { count: 2, .. }));
    }

    #[test]
    fn exchange_disambiguates_listing() {
        let handle = master().find(&InstrumentDescriptor::new("RELIANCE", "BSE")).unwrap();
        assert_eq!(handle.exchange_instrument_id, 500325);

        let err = master().find(&InstrumentDescriptor::new("RELIANCE", "")).unwrap_err();
        assert!(matches!(err, LookupError::Ambiguous { count: 2, .. }));
    }

    #[test]
    fn unknown_symbol_is_not_found() {
        let err = master().find(&InstrumentDescriptor::new("UNKNOWN", "NSE")).unwrap_err();
        assert_eq!(
            err,
            LookupError::NotFound {
                symbol: "UNKNOWN".to_string(),
                exchange: "NSE".to_string(),
            }
        );
    }

    #[test]
    fn wrong_exchange_is_not_found() {
        let err = master().find(&InstrumentDescriptor::new("NIFTY", "MCX")).unwrap_err();
        assert!(matches!(err, LookupError::NotFound { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MASTER.as_bytes()).unwrap();

        let master = InstrumentMaster::load(file.path()).unwrap();
        assert_eq!(master.len(), 5);
        assert!(!master.is_empty());
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"not\":\"a list\"}").unwrap();

        assert!(matches!(
            InstrumentMaster::load(file.path()),
            Err(MasterError::Parse { .. })
        ));
        assert!(matches!(
            InstrumentMaster::load(Path::new("/nonexistent/master.json")),
            Err(MasterError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn resolves_through_port() {
        let lookup: &dyn InstrumentLookupPort = &master();
        let handle = lookup
            .resolve(&InstrumentDescriptor::new("RELIANCE", "NSE"))
            .await
            .unwrap();
        assert_eq!(handle.exchange_instrument_id, 2885);
    }
}
