//! Subscription Service
//!
//! Runs subscribe/unsubscribe batches from downstream clients. Each
//! descriptor in a batch is processed independently and concurrently:
//!
//! ```text
//! lookup ─► feed request ─► journal ─► directory ─► notify requester
//! ```
//!
//! List entries that failed to decode skip the lookup and fail at that
//! step. Failures at any step are journaled and reported to the
//! requester; they never abort the rest of the batch.

use std::sync::Arc;

use futures::future::join_all;

use crate::application::ports::{
    ClientConnectionPort, FeedSubscriptionPort, InstrumentLookupPort, RecordSinkPort,
};
use crate::domain::instrument::{InstrumentDirectory, InstrumentRequest};
use crate::domain::subscription::{
    Operation, SubscriptionAck, SubscriptionFailure, SubscriptionOutcome,
};

/// Coordinates instrument lookup, feed requests and directory updates.
#[derive(Clone)]
pub struct SubscriptionService {
    lookup: Arc<dyn InstrumentLookupPort>,
    feed: Arc<dyn FeedSubscriptionPort>,
    directory: Arc<InstrumentDirectory>,
    journal: Arc<dyn RecordSinkPort>,
}

impl SubscriptionService {
    /// Create a service.
    #[must_use]
    pub fn new(
        lookup: Arc<dyn InstrumentLookupPort>,
        feed: Arc<dyn FeedSubscriptionPort>,
        directory: Arc<InstrumentDirectory>,
        journal: Arc<dyn RecordSinkPort>,
    ) -> Self {
        Self {
            lookup,
            feed,
            directory,
            journal,
        }
    }

    /// Subscribe to every requested instrument, returning one outcome per entry.
    pub async fn subscribe(
        &self,
        requests: &[InstrumentRequest],
        requester: &dyn ClientConnectionPort,
    ) -> Vec<SubscriptionOutcome> {
        self.run_batch(Operation::Subscribe, requests, requester)
            .await
    }

    /// Unsubscribe from every requested instrument, returning one outcome per entry.
    pub async fn unsubscribe(
        &self,
        requests: &[InstrumentRequest],
        requester: &dyn ClientConnectionPort,
    ) -> Vec<SubscriptionOutcome> {
        self.run_batch(Operation::Unsubscribe, requests, requester)
            .await
    }

    async fn run_batch(
        &self,
        operation: Operation,
        requests: &[InstrumentRequest],
        requester: &dyn ClientConnectionPort,
    ) -> Vec<SubscriptionOutcome> {
        tracing::debug!(
            operation = %operation,
            count = requests.len(),
            connection_id = requester.id(),
            "Processing subscription batch"
        );

        join_all(
            requests
                .iter()
                .map(|request| self.process(operation, request, requester)),
        )
        .await
    }

    async fn process(
        &self,
        operation: Operation,
        request: &InstrumentRequest,
        requester: &dyn ClientConnectionPort,
    ) -> SubscriptionOutcome {
        let outcome = self.request(operation, request).await;

        match &outcome.result {
            Ok(ack) => tracing::info!(
                operation = %operation,
                name = %ack.name,
                instrument_id = ack.exchange_instrument_id,
                "Subscription acknowledged"
            ),
            Err(failure) => tracing::warn!(
                operation = %operation,
                name = %failure.name,
                description = %failure.description,
                "Subscription failed"
            ),
        }

        if let Err(e) = self.journal.append(outcome.to_log_record()) {
            tracing::error!(operation = %operation, error = %e, "Journal write failed");
        }

        if let Ok(ack) = &outcome.result {
            match operation {
                Operation::Subscribe => self
                    .directory
                    .set(ack.exchange_instrument_id, ack.name.clone()),
                Operation::Unsubscribe => {
                    self.directory.remove(ack.exchange_instrument_id);
                }
            }
        }

        self.notify(requester, &outcome);
        outcome
    }

    async fn request(
        &self,
        operation: Operation,
        request: &InstrumentRequest,
    ) -> SubscriptionOutcome {
        let descriptor = match request {
            InstrumentRequest::Descriptor(descriptor) => descriptor,
            InstrumentRequest::Invalid { name, reason } => {
                return SubscriptionOutcome::failure(
                    operation,
                    SubscriptionFailure::lookup(
                        name.as_str(),
                        format!("invalid instrument: {reason}"),
                    ),
                );
            }
        };

        let handle = match self.lookup.resolve(descriptor).await {
            Ok(handle) => handle,
            Err(e) => {
                return SubscriptionOutcome::failure(
                    operation,
                    SubscriptionFailure::lookup(descriptor.symbol.as_str(), e.to_string()),
                );
            }
        };

        let response = match operation {
            Operation::Subscribe => self.feed.subscribe(&handle).await,
            Operation::Unsubscribe => self.feed.unsubscribe(&handle).await,
        };

        match response {
            Ok(details) => {
                SubscriptionOutcome::success(operation, SubscriptionAck::new(&handle, details))
            }
            Err(e) => SubscriptionOutcome::failure(
                operation,
                SubscriptionFailure::request(&handle, e.kind(), e.code(), e.description()),
            ),
        }
    }

    fn notify(&self, requester: &dyn ClientConnectionPort, outcome: &SubscriptionOutcome) {
        let text = match outcome.to_client_message().encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode subscription outcome");
                return;
            }
        };
        if let Err(e) = requester.send(&text) {
            tracing::warn!(
                connection_id = requester.id(),
                operation = %outcome.operation,
                error = %e,
                "Failed to notify requester"
            );
        }
    }
}

impl std::fmt::Debug for SubscriptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionService")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
