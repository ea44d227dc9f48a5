// Admission control and retention for a remote signing relay.
// Events pass the admission policy (kind, time window, per-pubkey rate limit)
// before reaching a store; the pruner deletes what outlives retention.

pub mod admission;
pub mod clock;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pruner;
pub mod rate_limit;
pub mod state;
pub mod store;

pub use admission::{AdmissionPolicy, Decision, QueryPurpose};
pub use clock::{Clock, MockClock, SystemClock};
pub use models::{Event, Filter, SUPPORTED_KINDS};
pub use pruner::{PruneConfig, PruneReport, Pruner, spawn_pruner};
pub use rate_limit::{KeyQuota, RateLimiter, spawn_sweeper};
pub use store::{EventStore, MemoryStore, StoreError};
