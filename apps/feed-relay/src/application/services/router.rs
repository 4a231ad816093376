//! Event Router
//!
//! Dispatches upstream market events: annotate with the display name,
//! journal by category, then broadcast candle and LTP updates to every
//! registered client.

use std::sync::Arc;

use serde_json::Value;

use super::registry::{BroadcastReport, ClientRegistry};
use crate::application::ports::SinkSet;
use crate::domain::instrument::InstrumentDirectory;
use crate::domain::market_data::{AnnotatedEvent, EventCategory, MarketEvent};
use crate::domain::protocol::OutboundMessage;

/// What happened to a routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The category is received but not processed.
    Ignored,
    /// The payload could not be decoded and was dropped.
    Malformed,
    /// The event was processed.
    Routed {
        /// Whether the journal accepted the record.
        journaled: bool,
        /// Broadcast result, for broadcast categories.
        broadcast: Option<BroadcastReport>,
    },
}

/// Routes upstream events to journals and clients.
#[derive(Debug, Clone)]
pub struct EventRouter {
    directory: Arc<InstrumentDirectory>,
    registry: Arc<ClientRegistry>,
    sinks: SinkSet,
}

impl EventRouter {
    /// Create a router.
    #[must_use]
    pub const fn new(
        directory: Arc<InstrumentDirectory>,
        registry: Arc<ClientRegistry>,
        sinks: SinkSet,
    ) -> Self {
        Self {
            directory,
            registry,
            sinks,
        }
    }

    /// Route a JSON text payload.
    pub fn route(&self, category: EventCategory, payload: &str) -> RouteOutcome {
        if category.journal().is_none() {
            return Self::ignore(category, payload);
        }
        match MarketEvent::decode(category, payload) {
            Ok(event) => self.route_event(event),
            Err(e) => Self::malformed(category, &e),
        }
    }

    /// Route an already-parsed payload (object or JSON string).
    pub fn route_value(&self, category: EventCategory, payload: Value) -> RouteOutcome {
        if category.journal().is_none() {
            return Self::ignore(category, &payload);
        }
        match MarketEvent::from_value(category, payload) {
            Ok(event) => self.route_event(event),
            Err(e) => Self::malformed(category, &e),
        }
    }

    /// Route a decoded event.
    pub fn route_event(&self, event: MarketEvent) -> RouteOutcome {
        let category = event.category();
        let Some(journal) = category.journal() else {
            return RouteOutcome::Ignored;
        };

        let name = event
            .instrument_id()
            .and_then(|id| self.directory.get(id));
        let annotated = event.annotate(name);

        let journaled = match self.sinks.get(journal).append(annotated.to_record()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(category = category.as_str(), error = %e, "Journal write failed");
                false
            }
        };

        let broadcast = category
            .is_broadcast()
            .then(|| self.broadcast(annotated));

        RouteOutcome::Routed {
            journaled,
            broadcast,
        }
    }

    fn broadcast(&self, event: AnnotatedEvent) -> BroadcastReport {
        let category = event.category();
        match OutboundMessage::MarketData(vec![event]).encode() {
            Ok(text) => self.registry.broadcast(&text),
            Err(e) => {
                tracing::error!(category = category.as_str(), error = %e, "Failed to encode market data");
                BroadcastReport::default()
            }
        }
    }

    fn ignore(category: EventCategory, payload: impl std::fmt::Display) -> RouteOutcome {
        if category == EventCategory::OpenInterest {
            tracing::debug!(payload = %payload, "Open interest");
        }
        RouteOutcome::Ignored
    }

    fn malformed(category: EventCategory, error: &impl std::fmt::Display) -> RouteOutcome {
        tracing::warn!(category = category.as_str(), error = %error, "Dropping malformed event");
        RouteOutcome::Malformed
    }
}
