//! File Journals
//!
//! JSON Lines journals, one file per category per day:
//!
//! ```text
//! {log_dir}/2024-01-25/marketdepth.jsonl
//! {log_dir}/2024-01-25/candle.jsonl
//! {log_dir}/2024-01-25/ltp.jsonl
//! {log_dir}/2024-01-25/sub_unsub.jsonl
//! ```
//!
//! Each sink owns a single writer task fed by an unbounded queue, so
//! `append` never blocks the caller and records keep their order. `close`
//! drops the queue and waits for the writer to drain and flush it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::{RecordSinkPort, SinkError, SinkReport, SinkSet};
use crate::domain::journal::{LogCategory, LogRecord};

const EXTENSION: &str = "jsonl";

/// Append-only JSON Lines journal backed by a writer task.
pub struct FileSink {
    category: LogCategory,
    path: PathBuf,
    tx: Mutex<Option<mpsc::UnboundedSender<LogRecord>>>,
    writer: Mutex<Option<JoinHandle<Result<u64, SinkError>>>>,
}

impl FileSink {
    /// Open (or create) the journal at `path` in append mode and start its writer.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Io` if the parent directory or file cannot be created.
    pub async fn open(category: LogCategory, path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_records(file, path.clone(), rx));

        tracing::debug!(category = %category, path = %path.display(), "Journal opened");
        Ok(Self {
            category,
            path,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("category", &self.category)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordSinkPort for FileSink {
    fn category(&self) -> LogCategory {
        self.category
    }

    fn append(&self, record: LogRecord) -> Result<(), SinkError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(SinkError::Closed(self.category))?;
        tx.send(record)
            .map_err(|_| SinkError::WriterFailed(self.category, "writer stopped".to_string()))
    }

    async fn close(&self) -> Result<SinkReport, SinkError> {
        drop(self.tx.lock().take());
        let writer = self
            .writer
            .lock()
            .take()
            .ok_or(SinkError::Closed(self.category))?;

        let records_written = writer
            .await
            .map_err(|e| SinkError::WriterFailed(self.category, e.to_string()))??;

        tracing::info!(
            category = %self.category,
            records_written,
            path = %self.path.display(),
            "Journal closed"
        );
        Ok(SinkReport {
            category: self.category,
            records_written,
        })
    }
}

async fn write_records(
    file: tokio::fs::File,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<LogRecord>,
) -> Result<u64, SinkError> {
    let mut out = BufWriter::new(file);
    let mut written = 0u64;
    let io_error = |source: std::io::Error| SinkError::Io {
        path: path.clone(),
        source,
    };

    while let Some(record) = rx.recv().await {
        let mut line = serde_json::to_vec(&record).map_err(|e| io_error(e.into()))?;
        line.push(b'\n');
        out.write_all(&line).await.map_err(io_error)?;
        written += 1;

        // Flush whenever the queue is momentarily empty.
        if rx.is_empty() {
            out.flush().await.map_err(io_error)?;
        }
    }

    out.flush().await.map_err(io_error)?;
    out.get_ref().sync_all().await.map_err(io_error)?;
    Ok(written)
}

/// Journal path for a category on a given day.
#[must_use]
pub fn journal_path(root: &Path, date: NaiveDate, category: LogCategory) -> PathBuf {
    root.join(date.format("%Y-%m-%d").to_string())
        .join(format!("{}.{EXTENSION}", category.file_stem()))
}

/// Open one file journal per category under `root/{date}/`.
///
/// # Errors
///
/// Returns the first `SinkError::Io` encountered.
pub async fn open_file_sinks(root: &Path, date: NaiveDate) -> Result<SinkSet, SinkError> {
    let open = |category| async move {
        FileSink::open(category, journal_path(root, date, category))
            .await
            .map(|sink| Arc::new(sink) as Arc<dyn RecordSinkPort>)
    };

    Ok(SinkSet {
        market_depth: open(LogCategory::MarketDepth).await?,
        candle: open(LogCategory::Candle).await?,
        last_traded_price: open(LogCategory::LastTradedPrice).await?,
        subscriptions: open(LogCategory::Subscriptions).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn record(n: u64) -> LogRecord {
        let mut fields = Map::new();
        fields.insert("ExchangeInstrumentID".to_string(), json!(n));
        fields.insert("name".to_string(), Value::Null);
        LogRecord::new(fields)
    }

    #[tokio::test]
    async fn writes_json_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ltp.jsonl");
        let sink = FileSink::open(LogCategory::LastTradedPrice, &path).await.unwrap();

        for n in 0..100 {
            sink.append(record(n)).unwrap();
        }
        let report = sink.close().await.unwrap();

        assert_eq!(report.records_written, 100);
        let contents = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<u64> = contents
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["ExchangeInstrumentID"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candle.jsonl");
        std::fs::write(&path, "{\"existing\":true}\n").unwrap();

        let sink = FileSink::open(LogCategory::Candle, &path).await.unwrap();
        sink.append(record(1)).unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "{\"existing\":true}\n{\"ExchangeInstrumentID\":1,\"name\":null}\n"
        );
    }

    #[tokio::test]
    async fn lines_are_self_describing_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 25).unwrap();
        let path = journal_path(dir.path(), date, LogCategory::Subscriptions);
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jsonl"));

        let sink = FileSink::open(LogCategory::Subscriptions, &path).await.unwrap();
        let mut success = Map::new();
        success.insert("name".to_string(), json!("NIFTY"));
        success.insert("error".to_string(), Value::Null);
        let mut failure = Map::new();
        failure.insert("stage".to_string(), json!("lookup"));
        failure.insert("description".to_string(), json!("instrument not found"));
        sink.append(LogRecord::new(success.clone())).unwrap();
        sink.append(LogRecord::new(failure.clone())).unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines, [Value::Object(success), Value::Object(failure)]);
    }

    #[tokio::test]
    async fn append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open(LogCategory::Subscriptions, dir.path().join("s.jsonl"))
            .await
            .unwrap();

        sink.close().await.unwrap();

        assert!(matches!(
            sink.append(record(1)),
            Err(SinkError::Closed(LogCategory::Subscriptions))
        ));
        assert!(matches!(
            sink.close().await,
            Err(SinkError::Closed(LogCategory::Subscriptions))
        ));
    }

    #[tokio::test]
    async fn opens_dated_directory_per_category() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 25).unwrap();

        let sinks = open_file_sinks(dir.path(), date).await.unwrap();
        for sink in sinks.all() {
            sink.close().await.unwrap();
        }

        for stem in ["marketdepth", "candle", "ltp", "sub_unsub"] {
            assert!(dir.path().join("2024-01-25").join(format!("{stem}.jsonl")).exists());
        }
        assert_eq!(sinks.get(LogCategory::Candle).category(), LogCategory::Candle);
    }

    #[tokio::test]
    async fn open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = FileSink::open(LogCategory::Candle, blocker.join("candle.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
    }
}
