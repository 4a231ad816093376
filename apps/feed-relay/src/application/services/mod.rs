//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ClientRegistry`: Downstream client tracking and broadcast
//! - `EventRouter`: Upstream event annotation, journaling and fan-out
//! - `SubscriptionService`: Per-instrument subscribe/unsubscribe batches
//! - `LifecycleController`: Orderly journal shutdown

mod lifecycle;
mod registry;
mod router;
mod subscription;

pub use lifecycle::{
    CloseFailure, DEFAULT_CLOSE_TIMEOUT, LifecycleController, ShutdownOutcome, ShutdownStatus,
    ShutdownTrigger,
};
pub use registry::{BroadcastReport, ClientRegistry};
pub use router::{EventRouter, RouteOutcome};
pub use subscription::SubscriptionService;
