//! Record Sink Port (Driven Port)
//!
//! Append-only journal for one log category.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::journal::{LogCategory, LogRecord};

/// Errors writing or closing a journal.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Filesystem error.
    #[error("journal I/O error at {path}: {source}")]
    Io {
        /// Journal path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The sink has already been closed.
    #[error("{0} journal is closed")]
    Closed(LogCategory),

    /// The writer task ended abnormally.
    #[error("{0} journal writer failed: {1}")]
    WriterFailed(LogCategory, String),
}

/// Summary returned when a sink closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkReport {
    /// Journal category.
    pub category: LogCategory,
    /// Records written over the sink's lifetime.
    pub records_written: u64,
}

/// Port for an append-only journal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSinkPort: Send + Sync {
    /// Category this sink journals.
    fn category(&self) -> LogCategory;

    /// Queue a record for writing. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Closed` once `close` has been called.
    fn append(&self, record: LogRecord) -> Result<(), SinkError>;

    /// Signal end of input and wait until every queued record is flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails or the writer cannot be joined.
    async fn close(&self) -> Result<SinkReport, SinkError>;
}

/// One sink per journal category.
#[derive(Clone)]
pub struct SinkSet {
    /// Market depth journal.
    pub market_depth: Arc<dyn RecordSinkPort>,
    /// Candle journal.
    pub candle: Arc<dyn RecordSinkPort>,
    /// Last traded price journal.
    pub last_traded_price: Arc<dyn RecordSinkPort>,
    /// Subscription outcome journal.
    pub subscriptions: Arc<dyn RecordSinkPort>,
}

impl SinkSet {
    /// Build a set by creating one sink per category.
    pub fn from_fn<F>(mut make: F) -> Self
    where
        F: FnMut(LogCategory) -> Arc<dyn RecordSinkPort>,
    {
        Self {
            market_depth: make(LogCategory::MarketDepth),
            candle: make(LogCategory::Candle),
            last_traded_price: make(LogCategory::LastTradedPrice),
            subscriptions: make(LogCategory::Subscriptions),
        }
    }

    /// Sink for a category.
    #[must_use]
    pub fn get(&self, category: LogCategory) -> &Arc<dyn RecordSinkPort> {
        match category {
            LogCategory::MarketDepth => &self.market_depth,
            LogCategory::Candle => &self.candle,
            LogCategory::LastTradedPrice => &self.last_traded_price,
            LogCategory::Subscriptions => &self.subscriptions,
        }
    }

    /// Every sink, in `LogCategory::ALL` order.
    #[must_use]
    pub fn all(&self) -> [Arc<dyn RecordSinkPort>; 4] {
        LogCategory::ALL.map(|category| Arc::clone(self.get(category)))
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSet").finish_non_exhaustive()
    }
}

// =============================================================================
// In-Memory Sink
// =============================================================================

/// In-memory implementation for testing.
#[derive(Debug)]
pub struct MemorySink {
    category: LogCategory,
    records: Mutex<Vec<LogRecord>>,
    closed: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink for a category.
    #[must_use]
    pub fn new(category: LogCategory) -> Self {
        Self {
            category,
            records: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Snapshot of appended records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RecordSinkPort for MemorySink {
    fn category(&self) -> LogCategory {
        self.category
    }

    fn append(&self, record: LogRecord) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed(self.category));
        }
        self.records.lock().push(record);
        Ok(())
    }

    async fn close(&self) -> Result<SinkReport, SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(SinkReport {
            category: self.category,
            records_written: self.records.lock().len() as u64,
        })
    }
}
