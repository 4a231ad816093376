//! Subscription Gateway
//!
//! REST adapter for the broker's instrument subscription endpoint.
//!
//! ```text
//! POST /apimarketdata/instruments/subscription   subscribe
//! PUT  /apimarketdata/instruments/subscription   unsubscribe
//! authorization: <token>
//! {"instruments":[{"exchangeSegment":1,"exchangeInstrumentID":26000}],"xtsMessageCode":1512}
//! ```
//!
//! One request is issued per configured message code. The broker answers
//! `{"type":"success"|"error","code":..,"description":..,"result":..}`,
//! with a 4xx status on rejection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::application::ports::{FeedRequestError, FeedSubscriptionPort};
use crate::domain::instrument::{FeedInstrumentHandle, FeedInstrumentId};
use crate::infrastructure::config::RelayConfig;

const SUCCESS_TYPE: &str = "success";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentRef {
    exchange_segment: u32,
    #[serde(rename = "exchangeInstrumentID")]
    exchange_instrument_id: FeedInstrumentId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRequest {
    instruments: [InstrumentRef; 1],
    xts_message_code: u16,
}

/// HTTP client for subscribe/unsubscribe requests.
#[derive(Debug, Clone)]
pub struct HttpFeedGateway {
    client: Client,
    url: String,
    token: String,
    message_codes: Vec<u16>,
}

impl HttpFeedGateway {
    /// Create a gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        message_codes: Vec<u16>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token: token.into(),
            message_codes,
        })
    }

    /// Create a gateway from relay configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.subscription_url(),
            config.credentials.token(),
            config.feed.message_codes.clone(),
            config.feed.request_timeout,
        )
    }

    async fn send_all(
        &self,
        method: Method,
        handle: &FeedInstrumentHandle,
    ) -> Result<Map<String, Value>, FeedRequestError> {
        let mut last = Map::new();
        for &code in &self.message_codes {
            last = self.send(method.clone(), handle, code).await?;
        }
        Ok(last)
    }

    async fn send(
        &self,
        method: Method,
        handle: &FeedInstrumentHandle,
        message_code: u16,
    ) -> Result<Map<String, Value>, FeedRequestError> {
        let body = SubscriptionRequest {
            instruments: [InstrumentRef {
                exchange_segment: handle.exchange_segment,
                exchange_instrument_id: handle.exchange_instrument_id,
            }],
            xts_message_code: message_code,
        };

        let response = self
            .client
            .request(method.clone(), &self.url)
            .header("authorization", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| FeedRequestError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FeedRequestError::Transport(e.to_string()))?;

        let fields = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) | Err(_) if !status.is_success() => {
                return Err(FeedRequestError::Transport(format!("HTTP {status}")));
            }
            Ok(_) => {
                return Err(FeedRequestError::InvalidResponse(
                    "expected JSON object".to_string(),
                ));
            }
            Err(e) => return Err(FeedRequestError::InvalidResponse(e.to_string())),
        };

        if fields.get("type").and_then(Value::as_str) == Some(SUCCESS_TYPE) {
            tracing::debug!(
                method = %method,
                instrument_id = handle.exchange_instrument_id,
                message_code,
                "Feed acknowledged subscription request"
            );
            return Ok(fields);
        }

        Err(rejection(&fields, status))
    }
}

fn rejection(fields: &Map<String, Value>, status: reqwest::StatusCode) -> FeedRequestError {
    let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
    FeedRequestError::Rejected {
        kind: text("type").unwrap_or_else(|| "error".to_string()),
        code: text("code"),
        description: text("description").unwrap_or_else(|| format!("HTTP {status}")),
    }
}

#[async_trait]
impl FeedSubscriptionPort for HttpFeedGateway {
    async fn subscribe(
        &self,
        handle: &FeedInstrumentHandle,
    ) -> Result<Map<String, Value>, FeedRequestError> {
        self.send_all(Method::POST, handle).await
    }

    async fn unsubscribe(
        &self,
        handle: &FeedInstrumentHandle,
    ) -> Result<Map<String, Value>, FeedRequestError> {
        self.send_all(Method::PUT, handle).await
    }
}
