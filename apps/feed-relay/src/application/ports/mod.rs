//! Application Ports (Driven)
//!
//! Interfaces the relay uses to reach external systems. Each port has an
//! infrastructure adapter and can be replaced with a fake in tests.
//!
//! - `InstrumentLookupPort`: descriptor → feed instrument handle
//! - `FeedSubscriptionPort`: upstream subscribe/unsubscribe requests
//! - `ClientConnectionPort`: outbound half of a downstream connection
//! - `RecordSinkPort`: append-only journal for one log category

mod client_connection_port;
mod feed_subscription_port;
mod instrument_lookup_port;
mod record_sink_port;

pub use client_connection_port::{ClientConnectionPort, ConnectionId, ConnectionSendError};
pub use feed_subscription_port::{FeedRequestError, FeedSubscriptionPort};
pub use instrument_lookup_port::{InstrumentLookupPort, LookupError};
pub use record_sink_port::{MemorySink, RecordSinkPort, SinkError, SinkReport, SinkSet};

#[cfg(test)]
pub use client_connection_port::MockClientConnectionPort;
#[cfg(test)]
pub use feed_subscription_port::MockFeedSubscriptionPort;
#[cfg(test)]
pub use instrument_lookup_port::MockInstrumentLookupPort;
#[cfg(test)]
pub use record_sink_port::MockRecordSinkPort;
