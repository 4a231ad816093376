//! Relay Configuration Settings
//!
//! Configuration types for the feed relay, loaded from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `FEED_TOKEN` | required |
//! | `FEED_USER_ID` | required |
//! | `FEED_BASE_URL` | `https://mtrade.arhamshare.com` |
//! | `FEED_MESSAGE_CODES` | `1502,1505,1512` |
//! | `FEED_REQUEST_TIMEOUT_SECS` | `10` |
//! | `FEED_HEARTBEAT_INTERVAL_SECS` | `25` |
//! | `FEED_HEARTBEAT_TIMEOUT_SECS` | `60` |
//! | `FEED_RECONNECT_DELAY_INITIAL_MS` | `500` |
//! | `FEED_RECONNECT_DELAY_MAX_SECS` | `10` |
//! | `FEED_RECONNECT_DELAY_MULTIPLIER` | `2.0` |
//! | `FEED_MAX_RECONNECT_ATTEMPTS` | `0` (unlimited) |
//! | `RELAY_BIND_ADDRESS` | `0.0.0.0` |
//! | `RELAY_WS_PORT` | `8085` |
//! | `RELAY_HEALTH_PORT` | `8082` |
//! | `RELAY_INSTRUMENT_MASTER_PATH` | `./instruments.json` |
//! | `RELAY_LOG_DIR` | `./logs` |
//! | `RELAY_SINK_CLOSE_TIMEOUT_SECS` | `10` |
//! | `RELAY_CLIENT_QUEUE_CAPACITY` | `1024` |

use std::path::PathBuf;
use std::time::Duration;

/// Default broker endpoint.
const DEFAULT_FEED_BASE_URL: &str = "https://mtrade.arhamshare.com";

/// Socket.IO path of the market data endpoint.
const FEED_SOCKET_PATH: &str = "/apimarketdata/socket.io/";

/// Message codes subscribed for each instrument by default.
const DEFAULT_MESSAGE_CODES: [u16; 3] = [1502, 1505, 1512];

/// Broker credentials for the market data API.
#[derive(Clone)]
pub struct Credentials {
    token: String,
    user_id: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(token: String, user_id: String) -> Self {
        Self { token, user_id }
    }

    /// Get the session token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Upstream feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Broker base URL (scheme and host).
    pub base_url: String,
    /// Message codes requested for every subscribed instrument.
    pub message_codes: Vec<u16>,
    /// Timeout for subscription requests.
    pub request_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FEED_BASE_URL.to_string(),
            message_codes: DEFAULT_MESSAGE_CODES.to_vec(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Feed WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Heartbeat ping interval, until the server announces its own.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(10),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Address both servers bind to.
    pub bind_address: String,
    /// Downstream WebSocket port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            ws_port: 8085,
            health_port: 8082,
        }
    }
}

/// Journal settings.
#[derive(Debug, Clone)]
pub struct JournalSettings {
    /// Root directory; journals go under `{log_dir}/{YYYY-MM-DD}/`.
    pub log_dir: PathBuf,
    /// Bound on each journal close at shutdown.
    pub close_timeout: Duration,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            close_timeout: Duration::from_secs(10),
        }
    }
}

/// Downstream client settings.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Outbound frames queued per connection before sends fail.
    pub queue_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Broker credentials.
    pub credentials: Credentials,
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Feed WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Journal settings.
    pub journal: JournalSettings,
    /// Downstream client settings.
    pub clients: ClientSettings,
    /// Instrument master file.
    pub instrument_master_path: PathBuf,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);

        let token = env.required("FEED_TOKEN")?;
        let user_id = env.required("FEED_USER_ID")?;

        let feed = FeedSettings {
            base_url: env
                .get("FEED_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| FeedSettings::default().base_url),
            message_codes: env
                .get("FEED_MESSAGE_CODES")
                .and_then(|v| parse_codes(&v))
                .unwrap_or_else(|| FeedSettings::default().message_codes),
            request_timeout: env.duration_secs(
                "FEED_REQUEST_TIMEOUT_SECS",
                FeedSettings::default().request_timeout,
            ),
        };

        let websocket = WebSocketSettings {
            heartbeat_interval: env.duration_secs(
                "FEED_HEARTBEAT_INTERVAL_SECS",
                WebSocketSettings::default().heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "FEED_HEARTBEAT_TIMEOUT_SECS",
                WebSocketSettings::default().heartbeat_timeout,
            ),
            reconnect_delay_initial: env.duration_millis(
                "FEED_RECONNECT_DELAY_INITIAL_MS",
                WebSocketSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "FEED_RECONNECT_DELAY_MAX_SECS",
                WebSocketSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "FEED_RECONNECT_DELAY_MULTIPLIER",
                WebSocketSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "FEED_MAX_RECONNECT_ATTEMPTS",
                WebSocketSettings::default().max_reconnect_attempts,
            ),
        };

        let server = ServerSettings {
            bind_address: env
                .get("RELAY_BIND_ADDRESS")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| ServerSettings::default().bind_address),
            ws_port: env.parse("RELAY_WS_PORT", ServerSettings::default().ws_port),
            health_port: env.parse("RELAY_HEALTH_PORT", ServerSettings::default().health_port),
        };

        let journal = JournalSettings {
            log_dir: env
                .get("RELAY_LOG_DIR")
                .filter(|v| !v.is_empty())
                .map_or_else(|| JournalSettings::default().log_dir, PathBuf::from),
            close_timeout: env.duration_secs(
                "RELAY_SINK_CLOSE_TIMEOUT_SECS",
                JournalSettings::default().close_timeout,
            ),
        };

        let clients = ClientSettings {
            queue_capacity: env
                .parse(
                    "RELAY_CLIENT_QUEUE_CAPACITY",
                    ClientSettings::default().queue_capacity,
                )
                .max(1),
        };

        let instrument_master_path = env
            .get("RELAY_INSTRUMENT_MASTER_PATH")
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from("./instruments.json"), PathBuf::from);

        Ok(Self {
            credentials: Credentials::new(token, user_id),
            feed,
            websocket,
            server,
            journal,
            clients,
            instrument_master_path,
        })
    }

    /// Get the feed's Socket.IO WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be parsed.
    pub fn feed_stream_url(&self) -> Result<String, ConfigError> {
        let base = self.feed.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        let url = reqwest::Url::parse_with_params(
            &format!("{ws_base}{FEED_SOCKET_PATH}"),
            &[
                ("token", self.credentials.token()),
                ("userID", self.credentials.user_id()),
                ("publishFormat", "JSON"),
                ("broadcastMode", "Full"),
                ("EIO", "3"),
                ("transport", "websocket"),
            ],
        )
        .map_err(|e| ConfigError::InvalidUrl(format!("{ws_base}: {e}")))?;

        Ok(url.into())
    }

    /// Get the feed's instrument subscription endpoint.
    #[must_use]
    pub fn subscription_url(&self) -> String {
        format!(
            "{}/apimarketdata/instruments/subscription",
            self.feed.base_url.trim_end_matches('/')
        )
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A configured URL is invalid.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

fn parse_codes(value: &str) -> Option<Vec<u16>> {
    let codes: Vec<u16> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    (!codes.is_empty()).then_some(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![("FEED_TOKEN", "tok"), ("FEED_USER_ID", "user1")]
    }

    #[test]
    fn missing_token_is_error() {
        let err = config_from(&[("FEED_USER_ID", "user1")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "FEED_TOKEN"));
    }

    #[test]
    fn empty_user_id_is_error() {
        let err = config_from(&[("FEED_TOKEN", "tok"), ("FEED_USER_ID", " ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(k) if k == "FEED_USER_ID"));
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&required()).unwrap();

        assert_eq!(config.feed.base_url, DEFAULT_FEED_BASE_URL);
        assert_eq!(config.feed.message_codes, vec![1502, 1505, 1512]);
        assert_eq!(config.server.ws_port, 8085);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.journal.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.clients.queue_capacity, 1024);
        assert_eq!(config.websocket.reconnect_delay_max, Duration::from_secs(10));
    }

    #[test]
    fn overrides_apply() {
        let mut vars = required();
        vars.extend([
            ("FEED_BASE_URL", "http://localhost:3000/"),
            ("FEED_MESSAGE_CODES", "1505, 1512"),
            ("RELAY_WS_PORT", "9000"),
            ("RELAY_LOG_DIR", "/var/log/relay"),
            ("RELAY_SINK_CLOSE_TIMEOUT_SECS", "3"),
            ("FEED_RECONNECT_DELAY_INITIAL_MS", "250"),
        ]);
        let config = config_from(&vars).unwrap();

        assert_eq!(config.feed.base_url, "http://localhost:3000");
        assert_eq!(config.feed.message_codes, vec![1505, 1512]);
        assert_eq!(config.server.ws_port, 9000);
        assert_eq!(config.journal.log_dir, PathBuf::from("/var/log/relay"));
        assert_eq!(config.journal.close_timeout, Duration::from_secs(3));
        assert_eq!(
            config.websocket.reconnect_delay_initial,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn invalid_optional_values_fall_back() {
        let mut vars = required();
        vars.extend([
            ("RELAY_WS_PORT", "not-a-port"),
            ("FEED_MESSAGE_CODES", "1505,abc"),
            ("RELAY_CLIENT_QUEUE_CAPACITY", "0"),
        ]);
        let config = config_from(&vars).unwrap();

        assert_eq!(config.server.ws_port, 8085);
        assert_eq!(config.feed.message_codes, vec![1502, 1505, 1512]);
        assert_eq!(config.clients.queue_capacity, 1);
    }

    #[test]
    fn stream_url_uses_websocket_scheme() {
        let config = config_from(&required()).unwrap();
        let url = config.feed_stream_url().unwrap();

        assert!(url.starts_with("wss://mtrade.arhamshare.com/apimarketdata/socket.io/?"));
        assert!(url.contains("token=tok"));
        assert!(url.contains("userID=user1"));
        assert!(url.contains("EIO=3"));
        assert!(url.contains("transport=websocket"));
    }

    #[test]
    fn subscription_url() {
        let mut vars = required();
        vars.push(("FEED_BASE_URL", "http://127.0.0.1:9999"));
        let config = config_from(&vars).unwrap();

        assert_eq!(
            config.subscription_url(),
            "http://127.0.0.1:9999/apimarketdata/instruments/subscription"
        );
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("secret-token".to_string(), "user1".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
