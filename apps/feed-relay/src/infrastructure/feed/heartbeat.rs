//! Heartbeat Manager
//!
//! Engine.IO v3 liveness: the client sends a `2` ping every ping interval
//! and expects a `3` pong within the ping timeout. Interval and timeout
//! come from the server's open packet, falling back to configuration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::WebSocketSettings;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Time without a pong before the connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::from_websocket_settings(&WebSocketSettings::default())
    }
}

impl HeartbeatConfig {
    /// Create a configuration.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        Self::new(settings.heartbeat_interval, settings.heartbeat_timeout)
    }

    /// Replace values announced by the server; zero keeps the current value.
    #[must_use]
    pub const fn negotiated(self, ping_interval_ms: u64, ping_timeout_ms: u64) -> Self {
        Self {
            ping_interval: if ping_interval_ms > 0 {
                Duration::from_millis(ping_interval_ms)
            } else {
                self.ping_interval
            },
            pong_timeout: if ping_timeout_ms > 0 {
                Duration::from_millis(ping_timeout_ms)
            } else {
                self.pong_timeout
            },
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send an Engine.IO ping.
    SendPing,
    /// No pong within the timeout; reconnect.
    Timeout,
}

/// State shared between the heartbeat manager and the read loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_pong: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create state as if a pong just arrived.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_pong: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record a pong (or any inbound traffic).
    pub fn record_pong(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Record that a ping was sent.
    pub fn mark_ping_sent(&self) {
        self.waiting_for_pong.store(true, Ordering::SeqCst);
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Time since the last pong.
    #[must_use]
    pub fn time_since_pong(&self) -> Duration {
        self.last_pong.read().elapsed()
    }
}

/// Periodically requests pings and reports timeouts.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the receiver drops, or a timeout is reported.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.ping_interval;
        let mut interval = tokio::time::interval_at(start, self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    return;
                }
                _ = interval.tick() => {
                    let event = if self.timed_out() {
                        HeartbeatEvent::Timeout
                    } else {
                        HeartbeatEvent::SendPing
                    };
                    if self.event_tx.send(event).await.is_err() || event == HeartbeatEvent::Timeout {
                        return;
                    }
                }
            }
        }
    }

    fn timed_out(&self) -> bool {
        if !self.state.is_waiting_for_pong() {
            return false;
        }
        let elapsed = self.state.time_since_pong();
        if elapsed <= self.config.pong_timeout {
            return false;
        }
        tracing::warn!(
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            timeout_ms = u64::try_from(self.config.pong_timeout.as_millis()).unwrap_or(u64::MAX),
            "Feed heartbeat timeout"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiated_overrides_non_zero() {
        let base = HeartbeatConfig::new(Duration::from_secs(25), Duration::from_secs(60));

        assert_eq!(
            base.negotiated(20_000, 5_000),
            HeartbeatConfig::new(Duration::from_secs(20), Duration::from_secs(5))
        );
        assert_eq!(base.negotiated(0, 0), base);
    }

    #[test]
    fn pong_clears_waiting() {
        let state = HeartbeatState::new();
        state.mark_ping_sent();
        assert!(state.is_waiting_for_pong());

        state.record_pong();
        assert!(!state.is_waiting_for_pong());
    }

    #[tokio::test]
    async fn requests_pings() {
        let config = HeartbeatConfig::new(Duration::from_millis(20), Duration::from_secs(1));
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            HeartbeatManager::new(config, Arc::new(HeartbeatState::new()), tx, cancel.clone()).run(),
        );

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(HeartbeatEvent::SendPing));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn reports_timeout_when_pong_missing() {
        let config = HeartbeatConfig::new(Duration::from_millis(20), Duration::from_millis(30));
        let state = Arc::new(HeartbeatState::new());
        state.mark_ping_sent();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(
            HeartbeatManager::new(config, state, tx, CancellationToken::new()).run(),
        );

        let mut saw_timeout = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            if event == HeartbeatEvent::Timeout {
                saw_timeout = true;
                break;
            }
        }

        assert!(saw_timeout);
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
