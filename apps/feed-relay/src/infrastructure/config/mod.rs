//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ClientSettings, ConfigError, Credentials, FeedSettings, JournalSettings, RelayConfig,
    ServerSettings, WebSocketSettings,
};
