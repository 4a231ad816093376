//! Engine.IO / Socket.IO Codec
//!
//! Decodes the text frames the broker's Socket.IO v2 server sends over a
//! raw WebSocket (Engine.IO protocol 3).
//!
//! # Frame Layout
//!
//! ```text
//! 0{"sid":"abc","pingInterval":25000,"pingTimeout":60000}   open
//! 2 / 3                                                      ping / pong
//! 40                                                         namespace connect
//! 41                                                         namespace disconnect
//! 42["1512-json-full","{\"ExchangeInstrumentID\":26000}"]    event
//! 42/ns,7["joined",{}]                                       event with namespace and ack id
//! 44"unauthorized"                                           error
//! ```

use serde::Deserialize;
use serde_json::Value;

/// Frame the client sends as an Engine.IO ping.
pub const PING_FRAME: &str = "2";

/// Frame the client sends as an Engine.IO pong.
pub const PONG_FRAME: &str = "3";

/// Errors decoding a frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Empty frame.
    #[error("empty frame")]
    Empty,

    /// Unknown Engine.IO packet type.
    #[error("unknown engine packet type: {0}")]
    UnknownEngineType(char),

    /// Unknown Socket.IO packet type.
    #[error("unknown socket packet type: {0}")]
    UnknownSocketType(char),

    /// Payload is not the expected JSON.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Handshake parameters from the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    /// Session id.
    pub sid: String,
    /// Interval at which the client must ping, in milliseconds.
    #[serde(default)]
    pub ping_interval: u64,
    /// Time the server waits for a ping, in milliseconds.
    #[serde(default)]
    pub ping_timeout: u64,
}

/// Engine.IO transport packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Session opened.
    Open(OpenHandshake),
    /// Server is closing the transport.
    Close,
    /// Ping (server-initiated on some deployments).
    Ping,
    /// Pong.
    Pong,
    /// Socket.IO packet carried as a message.
    Message(SocketPacket),
    /// Transport upgrade.
    Upgrade,
    /// No-op.
    Noop,
}

/// Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace joined.
    Connect,
    /// Namespace left.
    Disconnect,
    /// Named event with its first argument (`Null` when absent).
    Event {
        /// Event name, e.g. `1512-json-full`.
        name: String,
        /// Event data.
        data: Value,
    },
    /// Acknowledgment; ignored by the relay.
    Ack,
    /// Error raised by the server.
    Error(Value),
}

/// Decode one text frame.
///
/// # Errors
///
/// Returns an error for empty frames, unknown packet types or malformed
/// JSON payloads.
pub fn decode(frame: &str) -> Result<EnginePacket, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|e| CodecError::InvalidPayload(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(CodecError::UnknownEngineType(other)),
    }
}

fn decode_socket(frame: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => Ok(SocketPacket::Connect),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(body),
        '3' => Ok(SocketPacket::Ack),
        '4' => Ok(SocketPacket::Error(if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
        })),
        other => Err(CodecError::UnknownSocketType(other)),
    }
}

fn decode_event(body: &str) -> Result<SocketPacket, CodecError> {
    let args: Vec<Value> =
        serde_json::from_str(body).map_err(|e| CodecError::InvalidPayload(e.to_string()))?;
    let mut args = args.into_iter();

    let Some(Value::String(name)) = args.next() else {
        return Err(CodecError::InvalidPayload(
            "event name must be a string".to_string(),
        ));
    };
    Ok(SocketPacket::Event {
        name,
        data: args.next().unwrap_or(Value::Null),
    })
}

// `/namespace,` prefix; the default namespace has none.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    }
}

fn strip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}
