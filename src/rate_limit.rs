use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::metrics::{IDENTITIES_EVICTED, TRACKED_IDENTITIES};

/// Sliding-window history for a single pubkey.
///
/// The history has its own lock so different pubkeys never contend.
/// `last_seen` lives outside that lock and is read by the sweeper without
/// blocking callers.
#[derive(Debug)]
pub struct KeyQuota {
    requests: Mutex<VecDeque<Instant>>,
    last_seen: AtomicU64, // millis since `epoch`
    epoch: Instant,
}

impl KeyQuota {
    pub fn new(epoch: Instant) -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            last_seen: AtomicU64::new(0),
            epoch,
        }
    }

    /// Drops timestamps that fell out of the window, then records `now` if
    /// fewer than `limit` remain. Returns whether the request is allowed.
    pub fn check_and_record(&self, now: Instant, limit: usize, window: Duration) -> bool {
        // throttled pubkeys are still active, so they must not look idle
        self.touch(now);

        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(window_start) = now.checked_sub(window) {
            while requests.front().is_some_and(|&t| t <= window_start) {
                requests.pop_front();
            }
        }

        if requests.len() >= limit {
            return false;
        }

        requests.push_back(now);
        true
    }

    pub fn touch(&self, now: Instant) {
        let millis = now.saturating_duration_since(self.epoch).as_millis() as u64;
        self.last_seen.fetch_max(millis, Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_seen.load(Ordering::Relaxed))
    }

    // number of requests currently held in the window history
    pub fn recorded(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Per-pubkey sliding window rate limiter.
///
/// Entries are created lazily on first use and removed by [`RateLimiter::sweep`]
/// once idle for more than twice the window.
#[derive(Debug)]
pub struct RateLimiter {
    keys: DashMap<String, Arc<KeyQuota>>,
    limit: usize,
    window: Duration,
    epoch: Instant,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    // limit: max requests per window (at least 1)
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys: DashMap::new(),
            limit: limit.max(1),
            window,
            epoch: clock.now(),
            clock,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        let now = self.clock.now();
        let quota = self.quota_for(key, now);
        quota.check_and_record(now, self.limit, self.window)
    }

    // Touches last_seen while the shard guard is held, so a concurrent sweep
    // either removes the entry before we see it or sees it as fresh.
    fn quota_for(&self, key: &str, now: Instant) -> Arc<KeyQuota> {
        if let Some(entry) = self.keys.get(key) {
            entry.touch(now);
            return Arc::clone(entry.value());
        }

        let entry = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(KeyQuota::new(self.epoch)));
        entry.touch(now);
        let quota = Arc::clone(entry.value());
        drop(entry);

        TRACKED_IDENTITIES.set(self.keys.len() as f64);
        quota
    }

    /// Removes every pubkey untouched for longer than twice the window.
    /// Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let Some(threshold) = now.checked_sub(self.window * 2) else {
            return 0;
        };

        // collect first, no per-key lock is taken while iterating
        let stale: Vec<String> = self
            .keys
            .iter()
            .filter(|entry| entry.value().last_seen() < threshold)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in stale {
            // re-check, the key may have been used since the snapshot
            if self
                .keys
                .remove_if(&key, |_, quota| quota.last_seen() < threshold)
                .is_some()
            {
                evicted += 1;
            }
        }

        IDENTITIES_EVICTED.inc_by(evicted as f64);
        TRACKED_IDENTITIES.set(self.keys.len() as f64);
        evicted
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

// Background sweep - evicts idle pubkeys until cancelled
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick fires immediately, nothing to sweep yet
        ticker.tick().await;

        info!(interval_secs = every.as_secs(), "Rate limit sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Rate limit sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = limiter.sweep();
                    debug!(evicted, tracked = limiter.len(), "Rate limit sweep finished");
                }
            }
        }
    })
}
