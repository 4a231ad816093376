//! Client Connection Port (Driven Port)
//!
//! Outbound half of a downstream subscriber connection.

/// Identity of a single downstream connection, unique per process.
pub type ConnectionId = u64;

/// Errors sending to a downstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionSendError {
    /// The connection has closed.
    #[error("connection closed")]
    Closed,

    /// The connection's outbound queue is full.
    #[error("connection queue full")]
    Full,
}

/// Port for sending text frames to a downstream client.
///
/// `send` never blocks; a slow client fails the send instead of stalling
/// the caller.
#[cfg_attr(test, mockall::automock)]
pub trait ClientConnectionPort: Send + Sync {
    /// Identity of this connection.
    fn id(&self) -> ConnectionId;

    /// Queue a text frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or its queue is full.
    fn send(&self, text: &str) -> Result<(), ConnectionSendError>;
}
