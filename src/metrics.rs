use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram,
};


lazy_static! {
    pub static ref EVENTS_ACCEPTED: Counter =
        register_counter!("relay_events_accepted_total", "Events that passed admission").unwrap();
    pub static ref EVENTS_REJECTED: Counter =
        register_counter!("relay_events_rejected_total", "Events rejected by admission").unwrap();
    pub static ref FILTERS_REJECTED: Counter =
        register_counter!("relay_filters_rejected_total", "Filters rejected by admission").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("relay_rate_limited_total", "Events denied by the per-pubkey limiter").unwrap();
    pub static ref TRACKED_IDENTITIES: Gauge =
        register_gauge!("relay_rate_limit_identities", "Pubkeys currently tracked by the limiter").unwrap();
    pub static ref IDENTITIES_EVICTED: Counter =
        register_counter!("relay_rate_limit_evicted_total", "Idle pubkeys evicted by the sweeper").unwrap();
    pub static ref RECORDS_PRUNED: Counter =
        register_counter!("relay_records_pruned_total", "Expired records deleted by the pruner").unwrap();
    pub static ref PRUNE_FAILURES: Counter =
        register_counter!("relay_prune_failures_total", "Failed record deletions during pruning").unwrap();
    pub static ref PARTIAL_PRUNE_PASSES: Counter =
        register_counter!("relay_prune_partial_passes_total", "Pruning passes stopped by their time budget").unwrap();
    pub static ref PRUNE_DURATION: Histogram = register_histogram!(
        "relay_prune_pass_seconds",
        "Duration of a pruning pass in seconds"
    )
    .unwrap();
}
