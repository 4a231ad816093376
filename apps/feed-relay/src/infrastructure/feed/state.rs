//! Feed Connection State
//!
//! Shared, lock-light view of the upstream connection for the health
//! server and metrics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Socket.IO namespace joined; events flowing.
    Connected,
    /// Waiting to retry after a failure.
    Reconnecting,
    /// Gave up or hit an unrecoverable error.
    Error,
}

impl ConnectionState {
    /// Label for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

/// Tracked state of the upstream feed.
#[derive(Debug)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    events_received: AtomicU64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    /// Create state in `Disconnected`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            error_message: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            events_received: AtomicU64::new(0),
        }
    }

    /// Set the connection state.
    ///
    /// Entering `Connected` clears the error and reconnect counter.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.error_message.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Enter `Error` with a message.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.state.write() = ConnectionState::Error;
        *self.error_message.write() = Some(message.into());
    }

    /// Record a reconnection attempt.
    pub fn set_reconnecting(&self, attempt: u32) {
        *self.state.write() = ConnectionState::Reconnecting;
        self.reconnect_attempts.store(attempt, Ordering::Relaxed);
    }

    /// Count a received event.
    pub fn increment_events(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the feed is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Events received since start.
    #[must_use]
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Current reconnect attempt (0 while connected).
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Last successful connection time.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Last error message, cleared on reconnect.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error_message.read().clone()
    }
}
