//! Lifecycle Controller
//!
//! Orderly shutdown of the relay's journals. Every sink is closed
//! concurrently and the controller waits for all of them, each bounded
//! by a timeout, before reporting the exit status for the trigger.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;

use crate::application::ports::{RecordSinkPort, SinkReport, SinkSet};
use crate::domain::journal::LogCategory;

/// Default bound on each sink close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Triggers and Outcomes
// =============================================================================

/// Reason the relay is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownTrigger {
    /// Operator interrupt (Ctrl+C).
    Interrupt,
    /// Termination request (SIGTERM).
    Terminate,
    /// Restart requested by a supervisor (SIGUSR2).
    Restart,
    /// Unrecoverable internal failure.
    Fault,
}

impl ShutdownTrigger {
    /// Process exit code for this trigger.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Interrupt | Self::Terminate | Self::Restart => 0,
            Self::Fault => 1,
        }
    }

    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Restart => "restart",
            Self::Fault => "fault",
        }
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sink that did not close cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseFailure {
    /// The close did not finish within the timeout.
    TimedOut(LogCategory),
    /// The close returned an error.
    Failed(LogCategory, String),
}

/// How the close sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// Every sink flushed and closed.
    Completed,
    /// Some sinks failed or timed out; the rest closed.
    Degraded(Vec<CloseFailure>),
    /// One or more sink slots were never installed; nothing was closed.
    Aborted {
        /// Categories without a sink.
        missing: Vec<LogCategory>,
    },
    /// Shutdown had already run.
    AlreadyShutDown,
}

/// Result of a shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownOutcome {
    /// What triggered the shutdown.
    pub trigger: ShutdownTrigger,
    /// How the close sequence ended.
    pub status: ShutdownStatus,
    /// Reports from sinks that closed.
    pub reports: Vec<SinkReport>,
}

impl ShutdownOutcome {
    /// Process exit code. Always reflects the trigger.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.trigger.exit_code()
    }
}

// =============================================================================
// Controller
// =============================================================================

type Slots = [Option<Arc<dyn RecordSinkPort>>; 4];

/// Owns the journal sinks and closes them on shutdown.
pub struct LifecycleController {
    slots: Mutex<Slots>,
    close_timeout: Duration,
    shut_down: AtomicBool,
}

impl LifecycleController {
    /// Create a controller with no sinks installed.
    #[must_use]
    pub fn new(close_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new([None, None, None, None]),
            close_timeout,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Install a full set of sinks.
    pub fn install(&self, sinks: &SinkSet) {
        for sink in sinks.all() {
            self.install_sink(sink);
        }
    }

    /// Install one sink into the slot for its category.
    pub fn install_sink(&self, sink: Arc<dyn RecordSinkPort>) {
        let index = slot_index(sink.category());
        self.slots.lock()[index] = Some(sink);
    }

    /// Whether shutdown has started.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Close every sink and report the outcome.
    ///
    /// Safe to call more than once; later calls return
    /// `ShutdownStatus::AlreadyShutDown`.
    pub async fn shutdown(&self, trigger: ShutdownTrigger) -> ShutdownOutcome {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!(trigger = %trigger, "Shutdown already performed");
            return ShutdownOutcome {
                trigger,
                status: ShutdownStatus::AlreadyShutDown,
                reports: Vec::new(),
            };
        }

        tracing::info!(trigger = %trigger, "Shutting down journals");

        let slots = std::mem::replace(&mut *self.slots.lock(), [None, None, None, None]);

        let missing: Vec<LogCategory> = LogCategory::ALL
            .into_iter()
            .filter(|c| slots[slot_index(*c)].is_none())
            .collect();
        if !missing.is_empty() {
            tracing::error!(trigger = %trigger, missing = ?missing, "Journal sinks not installed; skipping close");
            return ShutdownOutcome {
                trigger,
                status: ShutdownStatus::Aborted { missing },
                reports: Vec::new(),
            };
        }

        let timeout = self.close_timeout;
        let results = join_all(slots.into_iter().flatten().map(|sink| async move {
            let category = sink.category();
            match tokio::time::timeout(timeout, sink.close()).await {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(e)) => Err(CloseFailure::Failed(category, e.to_string())),
                Err(_) => Err(CloseFailure::TimedOut(category)),
            }
        }))
        .await;

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(report) => {
                    tracing::info!(
                        category = %report.category,
                        records = report.records_written,
                        "Journal closed"
                    );
                    reports.push(report);
                }
                Err(failure) => {
                    tracing::error!(failure = ?failure, "Journal close failed");
                    failures.push(failure);
                }
            }
        }

        let status = if failures.is_empty() {
            ShutdownStatus::Completed
        } else {
            ShutdownStatus::Degraded(failures)
        };

        ShutdownOutcome {
            trigger,
            status,
            reports,
        }
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSE_TIMEOUT)
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("close_timeout", &self.close_timeout)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

const fn slot_index(category: LogCategory) -> usize {
    match category {
        LogCategory::MarketDepth => 0,
        LogCategory::Candle => 1,
        LogCategory::LastTradedPrice => 2,
        LogCategory::Subscriptions => 3,
    }
}
