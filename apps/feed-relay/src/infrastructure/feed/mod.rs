//! Upstream Feed Adapters
//!
//! Socket.IO market data stream client and the REST subscription gateway
//! for the broker's market data API.
//!
//! # Components
//!
//! - `codec`: Engine.IO / Socket.IO frame decoding
//! - `heartbeat`: Engine.IO ping/pong liveness
//! - `reconnect`: exponential backoff with jitter
//! - `stream`: connection loop emitting [`FeedEvent`]s
//! - `gateway`: subscribe/unsubscribe over HTTP
//! - `state`: connection state for health reporting

pub mod codec;
pub mod gateway;
pub mod heartbeat;
pub mod reconnect;
pub mod state;
pub mod stream;

pub use gateway::HttpFeedGateway;
pub use heartbeat::HeartbeatConfig;
pub use reconnect::ReconnectConfig;
pub use state::{ConnectionState, FeedState};
pub use stream::{FeedEvent, FeedStreamClient, FeedStreamConfig, FeedStreamError};
