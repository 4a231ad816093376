//! Feed Stream Client
//!
//! Holds the Socket.IO connection to the broker's market data stream and
//! forwards every recognised event to the relay as a [`FeedEvent`].
//!
//! # Connection Sequence
//!
//! 1. WebSocket connect to `/apimarketdata/socket.io/?token=..&EIO=3&transport=websocket`
//! 2. Server sends the Engine.IO open packet; heartbeat starts with its timings
//! 3. Server sends `40`; the client is connected
//! 4. Events arrive as `42["<code>-json-full", "<json>"]`
//!
//! A close frame, a `41` disconnect, a stream error or a missed pong
//! triggers a reconnect with exponential backoff.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{self, CodecError, EnginePacket, PING_FRAME, PONG_FRAME, SocketPacket};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::market_data::EventCategory;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed stream client.
#[derive(Debug, thiserror::Error)]
pub enum FeedStreamError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server rejected the Socket.IO connection.
    #[error("server error: {0}")]
    Rejected(String),

    /// Server left the namespace.
    #[error("server disconnected")]
    ServerDisconnect,

    /// No pong within the heartbeat timeout.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Feed Events
// =============================================================================

/// Events emitted by the feed stream client.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Socket.IO namespace joined.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Waiting before a reconnection attempt.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Market data event.
    Market {
        /// Category from the event name.
        category: EventCategory,
        /// Event data as received (usually a JSON string).
        payload: Value,
    },
    /// Error reported by the server.
    Error(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed stream client.
#[derive(Debug, Clone)]
pub struct FeedStreamConfig {
    /// Full stream URL including credentials.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat fallback when the server does not announce timings.
    pub heartbeat: HeartbeatConfig,
}

impl FeedStreamConfig {
    /// Create a configuration with default reconnect and heartbeat settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Socket.IO client for the broker market data stream.
pub struct FeedStreamClient {
    config: FeedStreamConfig,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
}

impl FeedStreamClient {
    /// Create a new client.
    #[must_use]
    pub const fn new(
        config: FeedStreamConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel,
        }
    }

    /// Run the connection loop until cancelled or reconnects are exhausted.
    ///
    /// # Errors
    ///
    /// Returns `MaxReconnectAttemptsExceeded` once the reconnect policy
    /// gives up.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedStreamError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed stream client cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!("Feed stream closed");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed stream connection error");
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;

                    let Some(delay) = reconnect_policy.next_delay() else {
                        return Err(FeedStreamError::MaxReconnectAttemptsExceeded);
                    };
                    let attempt = reconnect_policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconnecting to feed stream"
                    );
                    let _ = self.event_tx.send(FeedEvent::Reconnecting { attempt }).await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed stream cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedStreamError> {
        tracing::info!("Connecting to feed stream");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        let _guard = heartbeat_cancel.clone().drop_guard();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(event) = heartbeat_rx.recv() => match event {
                    HeartbeatEvent::SendPing => {
                        heartbeat_state.mark_ping_sent();
                        write.send(text_frame(PING_FRAME)).await?;
                    }
                    HeartbeatEvent::Timeout => return Err(FeedStreamError::HeartbeatTimeout),
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match codec::decode(&text) {
                        Ok(EnginePacket::Open(handshake)) => {
                            tracing::debug!(
                                sid = %handshake.sid,
                                ping_interval_ms = handshake.ping_interval,
                                ping_timeout_ms = handshake.ping_timeout,
                                "Feed stream handshake"
                            );
                            let config = self
                                .config
                                .heartbeat
                                .negotiated(handshake.ping_interval, handshake.ping_timeout);
                            tokio::spawn(
                                HeartbeatManager::new(
                                    config,
                                    heartbeat_state.clone(),
                                    heartbeat_tx.clone(),
                                    heartbeat_cancel.clone(),
                                )
                                .run(),
                            );
                        }
                        Ok(EnginePacket::Ping) => {
                            heartbeat_state.record_pong();
                            write.send(text_frame(PONG_FRAME)).await?;
                        }
                        Ok(EnginePacket::Pong) => heartbeat_state.record_pong(),
                        Ok(EnginePacket::Close) => return Err(FeedStreamError::ConnectionClosed),
                        Ok(EnginePacket::Message(packet)) => {
                            heartbeat_state.record_pong();
                            if self.handle_packet(packet).await? {
                                reconnect_policy.reset();
                            }
                        }
                        Ok(EnginePacket::Upgrade | EnginePacket::Noop) => {}
                        Err(e) => log_bad_frame(&text, &e),
                    },
                    Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Feed stream sent close frame");
                        return Err(FeedStreamError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(FeedStreamError::ConnectionClosed),
                },
            }
        }
    }

    /// Handle a Socket.IO packet. Returns `true` once the namespace is joined.
    async fn handle_packet(&self, packet: SocketPacket) -> Result<bool, FeedStreamError> {
        match packet {
            SocketPacket::Connect => {
                tracing::info!("Feed stream connected");
                let _ = self.event_tx.send(FeedEvent::Connected).await;
                Ok(true)
            }
            SocketPacket::Disconnect => Err(FeedStreamError::ServerDisconnect),
            SocketPacket::Error(detail) => {
                let message = match detail {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                tracing::error!(error = %message, "Feed stream rejected connection");
                let _ = self.event_tx.send(FeedEvent::Error(message.clone())).await;
                Err(FeedStreamError::Rejected(message))
            }
            SocketPacket::Event { name, data } => {
                match EventCategory::from_event_name(&name) {
                    Some(category) => {
                        let event = FeedEvent::Market {
                            category,
                            payload: data,
                        };
                        if self.event_tx.send(event).await.is_err() {
                            tracing::debug!("Feed event receiver dropped");
                        }
                    }
                    None => tracing::debug!(event = %name, data = %data, "Feed stream event"),
                }
                Ok(false)
            }
            SocketPacket::Ack => Ok(false),
        }
    }
}

fn text_frame(frame: &str) -> Message {
    Message::Text(frame.to_string().into())
}

fn log_bad_frame(text: &str, error: &CodecError) {
    let preview: String = text.chars().take(120).collect();
    tracing::warn!(error = %error, frame = %preview, "Undecodable feed frame");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> (FeedStreamClient, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let client = FeedStreamClient::new(
            FeedStreamConfig::new("ws://127.0.0.1:1/socket.io/"),
            tx,
            CancellationToken::new(),
        );
        (client, rx)
    }

    #[tokio::test]
    async fn market_event_is_forwarded() {
        let (client, mut rx) = client();

        let joined = client
            .handle_packet(SocketPacket::Event {
                name: "1512-json-full".to_string(),
                data: json!("{\"ExchangeInstrumentID\":26000}"),
            })
            .await
            .unwrap();

        assert!(!joined);
        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::Market {
                category: EventCategory::LastTradedPrice,
                payload: json!("{\"ExchangeInstrumentID\":26000}"),
            })
        );
    }

    #[tokio::test]
    async fn unknown_event_is_not_forwarded() {
        let (client, mut rx) = client();

        client
            .handle_packet(SocketPacket::Event {
                name: "joined".to_string(),
                data: json!({"userID": "U1"}),
            })
            .await
            .unwrap();

        drop(client);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn connect_and_error_packets() {
        let (client, mut rx) = client();

        assert!(client.handle_packet(SocketPacket::Connect).await.unwrap());
        assert_eq!(rx.recv().await, Some(FeedEvent::Connected));

        let err = client
            .handle_packet(SocketPacket::Error(json!("Invalid Token")))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedStreamError::Rejected(ref m) if m == "Invalid Token"));
        assert_eq!(rx.recv().await, Some(FeedEvent::Error("Invalid Token".to_string())));

        assert!(matches!(
            client.handle_packet(SocketPacket::Disconnect).await,
            Err(FeedStreamError::ServerDisconnect)
        ));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut config = FeedStreamConfig::new("ws://127.0.0.1:1/socket.io/");
        config.reconnect.max_attempts = 1;
        config.reconnect.initial_delay = std::time::Duration::from_millis(1);
        let client = Arc::new(FeedStreamClient::new(config, tx, CancellationToken::new()));

        let result = client.run().await;

        assert!(matches!(result, Err(FeedStreamError::MaxReconnectAttemptsExceeded)));
        assert_eq!(rx.recv().await, Some(FeedEvent::Disconnected));
        assert_eq!(rx.recv().await, Some(FeedEvent::Reconnecting { attempt: 1 }));
    }
}
