// Retention task: deletes supported-kind events older than the retention
// window. A pass stops when its time budget runs out and leaves the rest for
// the next tick, so an event may outlive the window by one interval plus the
// budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::metrics::{PARTIAL_PRUNE_PASSES, PRUNE_DURATION, PRUNE_FAILURES, RECORDS_PRUNED};
use crate::models::{Event, Filter, SUPPORTED_KINDS};
use crate::store::EventStore;

/// Configuration for the pruning task.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Maximum age of a stored event (default: 10 minutes).
    pub retention: Duration,
    /// Time between passes (default: half the retention plus one minute).
    pub interval: Duration,
    /// Wall-clock ceiling for a single pass (default: 30 seconds).
    pub budget: Duration,
}

impl PruneConfig {
    pub fn for_retention(retention: Duration) -> Self {
        Self {
            retention,
            interval: retention / 2 + Duration::from_secs(60),
            budget: Duration::from_secs(30),
        }
    }
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self::for_retention(Duration::from_secs(10 * 60))
    }
}

/// What a single pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Unix seconds; candidates were created at or before this.
    pub cutoff: i64,
    pub found: usize,
    pub deleted: usize,
    pub failed: usize,
    pub budget_exhausted: bool,
    pub cancelled: bool,
}

impl PruneReport {
    // ran to the end
    pub fn is_finished(&self) -> bool {
        !self.budget_exhausted && !self.cancelled
    }

    // ran to the end and every candidate is gone
    pub fn is_complete(&self) -> bool {
        self.is_finished() && self.deleted == self.found
    }
}

// Expired event plus the stores (by index) whose query returned it
struct Candidate {
    event: Event,
    sources: Vec<usize>,
}

pub struct Pruner {
    stores: Vec<Arc<dyn EventStore>>,
    config: PruneConfig,
    clock: Arc<dyn Clock>,
}

impl Pruner {
    pub fn new(stores: Vec<Arc<dyn EventStore>>, config: PruneConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            stores,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &PruneConfig {
        &self.config
    }

    /// Runs one pass: finds expired events in every readable store, then
    /// deletes them until done, out of budget or cancelled.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> PruneReport {
        let started = Instant::now();
        let deadline = started + self.config.budget;
        let cutoff = self.clock.unix_now() - self.config.retention.as_secs() as i64;

        let mut report = PruneReport {
            cutoff,
            ..Default::default()
        };

        let candidates = self.collect_expired(cutoff, deadline).await;
        report.found = candidates.len();

        if candidates.is_empty() {
            PRUNE_DURATION.observe(started.elapsed().as_secs_f64());
            debug!(cutoff, "Prune pass: no expired events");
            return report;
        }

        for candidate in &candidates {
            if cancel.is_cancelled() {
                report.cancelled = true;
                info!(deleted = report.deleted, found = report.found, "Prune pass cancelled");
                break;
            }
            if Instant::now() >= deadline {
                report.budget_exhausted = true;
                PARTIAL_PRUNE_PASSES.inc();
                info!(
                    deleted = report.deleted,
                    found = report.found,
                    budget_secs = self.config.budget.as_secs(),
                    "Prune pass ran out of time, remaining events left for next pass"
                );
                break;
            }

            if self.delete_from_sources(candidate, deadline).await {
                report.deleted += 1;
            } else {
                report.failed += 1;
            }
        }

        RECORDS_PRUNED.inc_by(report.deleted as f64);
        PRUNE_FAILURES.inc_by(report.failed as f64);
        PRUNE_DURATION.observe(started.elapsed().as_secs_f64());

        if report.is_finished() && report.failed > 0 {
            warn!(
                deleted = report.deleted,
                failed = report.failed,
                cutoff,
                "Prune pass finished with failed deletions"
            );
        } else if report.is_finished() {
            info!(deleted = report.deleted, cutoff, "Prune pass completed");
        }
        report
    }

    // Targeted query per store. A store that errors or runs past the deadline
    // is skipped for the rest of this pass, deletes included.
    async fn collect_expired(&self, cutoff: i64, deadline: Instant) -> Vec<Candidate> {
        let filter = Filter {
            kinds: SUPPORTED_KINDS.to_vec(),
            until: Some(cutoff),
            ..Default::default()
        };

        let mut by_id: HashMap<String, usize> = HashMap::new();
        let mut expired: Vec<Candidate> = Vec::new();
        for (idx, store) in self.stores.iter().enumerate() {
            let events = match timeout_at(deadline, store.query(&filter)).await {
                Ok(Ok(events)) => events,
                Ok(Err(e)) => {
                    warn!(store = idx, error = %e, "Prune pass: can't read from store");
                    continue;
                }
                Err(_) => {
                    warn!(store = idx, "Prune pass: store query ran past the time budget");
                    continue;
                }
            };

            for event in events {
                // never trust the store with the age check
                if event.created_at > cutoff {
                    continue;
                }
                match by_id.get(&event.id) {
                    Some(&pos) => expired[pos].sources.push(idx),
                    None => {
                        by_id.insert(event.id.clone(), expired.len());
                        expired.push(Candidate {
                            event,
                            sources: vec![idx],
                        });
                    }
                }
            }
        }
        expired
    }

    // Tries every source store even after one fails. Counts as deleted only
    // when all of them succeeded.
    async fn delete_from_sources(&self, candidate: &Candidate, deadline: Instant) -> bool {
        let event = &candidate.event;
        let mut ok = true;
        for &idx in &candidate.sources {
            match timeout_at(deadline, self.stores[idx].delete(event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(store = idx, id = %event.id, error = %e, "Prune pass: can't delete event");
                    ok = false;
                }
                Err(_) => {
                    warn!(store = idx, id = %event.id, "Prune pass: delete ran past the time budget");
                    ok = false;
                }
            }
        }
        ok
    }
}

// Periodic pruning. Every tick runs a pass no matter how the previous one
// ended; stops when `cancel` fires.
pub fn spawn_pruner(pruner: Arc<Pruner>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let every = pruner.config().interval;
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = every.as_secs(),
            retention_secs = pruner.config().retention.as_secs(),
            budget_secs = pruner.config().budget.as_secs(),
            "Prune task started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Prune task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    pruner.run_pass(&cancel).await;
                }
            }
        }
    })
}
