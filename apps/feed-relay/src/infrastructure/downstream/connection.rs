//! Outbound half of a downstream WebSocket connection.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::application::ports::{ClientConnectionPort, ConnectionId, ConnectionSendError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Queue-backed sender for one WebSocket connection.
///
/// Frames are queued on a bounded channel drained by the connection's
/// writer task; a full queue fails the send.
#[derive(Debug)]
pub struct WsConnection {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
}

impl WsConnection {
    /// Create a connection with a fresh id and a queue of `capacity` frames.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }
}

impl ClientConnectionPort for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, text: &str) -> Result<(), ConnectionSendError> {
        self.tx.try_send(text.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => ConnectionSendError::Full,
            TrySendError::Closed(_) => ConnectionSendError::Closed,
        })
    }
}
