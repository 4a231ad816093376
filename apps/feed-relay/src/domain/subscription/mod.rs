//! Subscription Outcomes
//!
//! Results of per-instrument subscribe/unsubscribe requests. Every
//! outcome, success or failure, is both journaled and reported back to
//! the requesting client tagged with its operation.
//!
//! # Wire Shapes
//!
//! ```json
//! // journal (success)
//! {"exchangeSegment":1,"exchangeInstrumentID":26000,"instrumentType":"INDEX","name":"NIFTY","type":"success","operation":"Subscribe","error":null}
//! // client (failure)
//! {"message":{"type":"error","code":"LOOKUP","description":"instrument not found","name":"NIFTY","stage":"lookup","operation":"Subscribe"}}
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::instrument::{FeedInstrumentHandle, FeedInstrumentId};
use super::journal::LogRecord;
use super::protocol::OutboundMessage;

const OPERATION_FIELD: &str = "operation";
const ERROR_FIELD: &str = "error";

// =============================================================================
// Operation
// =============================================================================

/// Subscription operation requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    /// Start receiving events for an instrument.
    Subscribe,
    /// Stop receiving events for an instrument.
    Unsubscribe,
}

impl Operation {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "Subscribe",
            Self::Unsubscribe => "Unsubscribe",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Acknowledgment
// =============================================================================

/// Successful acknowledgment from the feed's subscription endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAck {
    /// Numeric exchange segment.
    pub exchange_segment: u32,

    /// Feed instrument id.
    #[serde(rename = "exchangeInstrumentID")]
    pub exchange_instrument_id: FeedInstrumentId,

    /// Instrument type from the instrument master.
    pub instrument_type: String,

    /// Display name.
    pub name: String,

    /// Fields returned by the feed (`type`, `code`, `description`, `result`...).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl SubscriptionAck {
    /// Build an acknowledgment for a handle from the feed's response body.
    #[must_use]
    pub fn new(handle: &FeedInstrumentHandle, details: Map<String, Value>) -> Self {
        Self {
            exchange_segment: handle.exchange_segment,
            exchange_instrument_id: handle.exchange_instrument_id,
            instrument_type: handle.instrument_type.clone(),
            name: handle.name.clone(),
            details,
        }
    }
}

// =============================================================================
// Failure
// =============================================================================

/// Step at which a subscription request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The descriptor could not be resolved.
    Lookup,
    /// The feed rejected the request or was unreachable.
    Request,
}

/// A failed subscribe or unsubscribe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFailure {
    /// Failure type as reported by the feed, or `error`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Error code, if one was reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Human-readable description.
    pub description: String,

    /// Display name or requested symbol.
    pub name: String,

    /// Feed instrument id, when the lookup succeeded.
    #[serde(
        rename = "exchangeInstrumentID",
        skip_serializing_if = "Option::is_none"
    )]
    pub exchange_instrument_id: Option<FeedInstrumentId>,

    /// Step that failed.
    pub stage: FailureStage,
}

impl SubscriptionFailure {
    /// Failure to decode or resolve the instrument requested as `name`.
    #[must_use]
    pub fn lookup(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            code: Some("LOOKUP".to_string()),
            description: description.into(),
            name: name.into(),
            exchange_instrument_id: None,
            stage: FailureStage::Lookup,
        }
    }

    /// Failure reported for a resolved handle.
    #[must_use]
    pub fn request(
        handle: &FeedInstrumentHandle,
        kind: impl Into<String>,
        code: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            code,
            description: description.into(),
            name: handle.name.clone(),
            exchange_instrument_id: Some(handle.exchange_instrument_id),
            stage: FailureStage::Request,
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of one descriptor in a subscribe/unsubscribe batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionOutcome {
    /// Operation that was attempted.
    pub operation: Operation,
    /// Acknowledgment or failure.
    pub result: Result<SubscriptionAck, SubscriptionFailure>,
}

impl SubscriptionOutcome {
    /// Successful outcome.
    #[must_use]
    pub const fn success(operation: Operation, ack: SubscriptionAck) -> Self {
        Self {
            operation,
            result: Ok(ack),
        }
    }

    /// Failed outcome.
    #[must_use]
    pub const fn failure(operation: Operation, failure: SubscriptionFailure) -> Self {
        Self {
            operation,
            result: Err(failure),
        }
    }

    /// Whether the feed acknowledged the request.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Display name carried by the outcome.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.result {
            Ok(ack) => &ack.name,
            Err(failure) => &failure.name,
        }
    }

    /// Message reported to the requesting client.
    #[must_use]
    pub fn to_client_message(&self) -> OutboundMessage {
        OutboundMessage::Message(self.fields())
    }

    /// Journal record; successes carry `error: null`.
    #[must_use]
    pub fn to_log_record(&self) -> LogRecord {
        let mut fields = self.fields();
        if self.is_success() {
            fields.insert(ERROR_FIELD.to_string(), Value::Null);
        }
        LogRecord::new(fields)
    }

    fn fields(&self) -> Map<String, Value> {
        let value = match &self.result {
            Ok(ack) => serde_json::to_value(ack),
            Err(failure) => serde_json::to_value(failure),
        };
        let mut fields = match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        fields.insert(
            OPERATION_FIELD.to_string(),
            Value::from(self.operation.as_str()),
        );
        fields
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nifty() -> FeedInstrumentHandle {
        FeedInstrumentHandle {
            exchange_segment: 1,
            exchange_instrument_id: 26000,
            instrument_type: "INDEX".to_string(),
            name: "NIFTY".to_string(),
        }
    }

    fn ack() -> SubscriptionAck {
        let mut details = Map::new();
        details.insert("type".to_string(), json!("success"));
        details.insert("code".to_string(), json!("s-session-0001"));
        SubscriptionAck::new(&nifty(), details)
    }

    #[test]
    fn success_log_record_has_null_error() {
        let outcome = SubscriptionOutcome::success(Operation::Subscribe, ack());
        let record = outcome.to_log_record();

        assert_eq!(record.get("operation"), Some(&json!("Subscribe")));
        assert_eq!(record.get("error"), Some(&Value::Null));
        assert_eq!(record.get("exchangeInstrumentID"), Some(&json!(26000)));
        assert_eq!(record.get("type"), Some(&json!("success")));
    }

    #[test]
    fn success_client_message_has_no_error_field() {
        let outcome = SubscriptionOutcome::success(Operation::Unsubscribe, ack());
        let OutboundMessage::Message(fields) = outcome.to_client_message() else {
            panic!("expected message");
        };

        assert_eq!(fields["operation"], json!("Unsubscribe"));
        assert_eq!(fields["name"], json!("NIFTY"));
        assert!(!fields.contains_key("error"));
    }

    #[test]
    fn lookup_failure_fields() {
        let failure = SubscriptionFailure::lookup("UNKNOWN", "instrument not found");
        let outcome = SubscriptionOutcome::failure(Operation::Subscribe, failure);

        let record = outcome.to_log_record();
        assert_eq!(record.get("type"), Some(&json!("error")));
        assert_eq!(record.get("stage"), Some(&json!("lookup")));
        assert_eq!(record.get("name"), Some(&json!("UNKNOWN")));
        assert_eq!(record.get("operation"), Some(&json!("Subscribe")));
        assert!(record.get("error").is_none());
        assert!(record.get("exchangeInstrumentID").is_none());
        assert!(!outcome.is_success());
    }

    #[test]
    fn request_failure_keeps_feed_code() {
        let failure = SubscriptionFailure::request(
            &nifty(),
            "error",
            Some("e-session-0002".to_string()),
            "Instrument Already Subscribed !",
        );
        let outcome = SubscriptionOutcome::failure(Operation::Subscribe, failure);
        let OutboundMessage::Message(fields) = outcome.to_client_message() else {
            panic!("expected message");
        };

        assert_eq!(fields["code"], json!("e-session-0002"));
        assert_eq!(fields["exchangeInstrumentID"], json!(26000));
        assert_eq!(fields["stage"], json!("request"));
        assert_eq!(outcome.name(), "NIFTY");
    }
}
