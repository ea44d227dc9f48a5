// Retention pass tests against in-memory and instrumented stores.

use async_trait::async_trait;
use signer_relay::{
    Clock, Event, EventStore, Filter, MemoryStore, MockClock, PruneConfig, Pruner, StoreError,
    spawn_pruner,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RETENTION: Duration = Duration::from_secs(10 * 60);

fn event(id: &str, kind: u16, created_at: i64) -> Event {
    Event {
        id: id.to_string(),
        pubkey: "alice".to_string(),
        created_at,
        kind,
        tags: vec![vec!["p".to_string(), "bob".to_string()]],
        content: String::new(),
        sig: String::new(),
    }
}

fn pruner(store: Arc<dyn EventStore>, clock: &MockClock) -> Pruner {
    pruner_over(vec![store], clock)
}

fn pruner_over(stores: Vec<Arc<dyn EventStore>>, clock: &MockClock) -> Pruner {
    Pruner::new(stores, PruneConfig::for_retention(RETENTION), Arc::new(clock.clone()))
}

// Delegates to a MemoryStore, with slow deletes and selected failures
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    delete_delay: Option<Duration>,
    failing_ids: HashSet<String>,
    failing_query: bool,
    failing_delete: bool,
    deletes: AtomicUsize,
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, StoreError> {
        if self.failing_query {
            return Err(StoreError::Unavailable("disk gone".to_string()));
        }
        self.inner.query(filter).await
    }

    async fn delete(&self, event: &Event) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_delete || self.failing_ids.contains(&event.id) {
            return Err(StoreError::Backend("locked".to_string()));
        }
        self.inner.delete(event).await
    }

    async fn save(&self, event: &Event) -> Result<(), StoreError> {
        self.inner.save(event).await
    }
}

#[tokio::test]
async fn test_record_survives_until_retention_elapses() {
    let clock = MockClock::starting_now();
    let store = Arc::new(MemoryStore::new());
    let created = clock.unix_now();
    store.save(&event("a", 24133, created)).await.unwrap();

    let pruner = pruner(store.clone(), &clock);
    let cancel = CancellationToken::new();

    clock.advance(Duration::from_secs(9 * 60 + 59));
    let report = pruner.run_pass(&cancel).await;
    assert_eq!(report.found, 0);
    assert!(store.contains("a"));

    clock.advance(Duration::from_secs(2));
    let report = pruner.run_pass(&cancel).await;
    assert_eq!(report.found, 1);
    assert_eq!(report.deleted, 1);
    assert!(report.is_complete());
    assert!(!store.contains("a"));
}

#[tokio::test]
async fn test_only_supported_kinds_are_pruned() {
    let clock = MockClock::starting_now();
    let store = Arc::new(MemoryStore::new());
    let old = clock.unix_now() - 3600;
    store.save(&event("connect", 24133, old)).await.unwrap();
    store.save(&event("legacy", 24135, old)).await.unwrap();
    store.save(&event("note", 1, old)).await.unwrap();
    store.save(&event("fresh", 24133, clock.unix_now())).await.unwrap();

    let report = pruner(store.clone(), &clock).run_pass(&CancellationToken::new()).await;

    assert_eq!(report.deleted, 2);
    assert!(store.contains("note"));
    assert!(store.contains("fresh"));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_failed_delete_does_not_abort_pass() {
    let clock = MockClock::starting_now();
    let old = clock.unix_now() - 3600;
    let store = Arc::new(FlakyStore {
        failing_ids: HashSet::from(["b".to_string()]),
        ..Default::default()
    });
    for id in ["a", "b", "c"] {
        store.save(&event(id, 24133, old)).await.unwrap();
    }

    let report = pruner(store.clone(), &clock).run_pass(&CancellationToken::new()).await;

    assert_eq!(report.found, 3);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.failed, 1);
    assert!(report.is_finished());
    assert!(!report.is_complete());
    assert!(store.inner.contains("b"));
}

#[tokio::test]
async fn test_unreadable_store_is_skipped() {
    let clock = MockClock::starting_now();
    let old = clock.unix_now() - 3600;

    let broken = Arc::new(FlakyStore {
        failing_query: true,
        ..Default::default()
    });
    let healthy = Arc::new(MemoryStore::new());
    healthy.save(&event("a", 24133, old)).await.unwrap();

    let stores: Vec<Arc<dyn EventStore>> = vec![broken.clone(), healthy.clone()];
    let report = pruner_over(stores, &clock).run_pass(&CancellationToken::new()).await;

    // found through the healthy store, the unreadable one is left alone
    assert_eq!(report.found, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(broken.deletes.load(Ordering::Relaxed), 0);
    assert!(healthy.is_empty());
}

#[tokio::test]
async fn test_down_store_does_not_block_healthy_store() {
    let clock = MockClock::starting_now();
    let old = clock.unix_now() - 3600;

    let down = Arc::new(FlakyStore {
        failing_query: true,
        failing_delete: true,
        ..Default::default()
    });
    let healthy = Arc::new(MemoryStore::new());
    healthy.save(&event("a", 24133, old)).await.unwrap();

    let stores: Vec<Arc<dyn EventStore>> = vec![down.clone(), healthy.clone()];
    let pruner = pruner_over(stores, &clock);

    for _ in 0..2 {
        let report = pruner.run_pass(&CancellationToken::new()).await;
        assert!(report.is_complete(), "{report:?}");
    }
    assert!(healthy.is_empty());
    assert_eq!(down.deletes.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_delete_continues_past_failing_source() {
    let clock = MockClock::starting_now();
    let old = clock.unix_now() - 3600;

    // readable, but refuses deletes
    let stuck = Arc::new(FlakyStore {
        failing_delete: true,
        ..Default::default()
    });
    let healthy = Arc::new(MemoryStore::new());
    for store in [stuck.clone() as Arc<dyn EventStore>, healthy.clone()] {
        store.save(&event("a", 24133, old)).await.unwrap();
    }

    let stores: Vec<Arc<dyn EventStore>> = vec![stuck.clone(), healthy.clone()];
    let report = pruner_over(stores, &clock).run_pass(&CancellationToken::new()).await;

    assert_eq!(report.found, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.is_complete());
    assert!(stuck.inner.contains("a"));
    assert!(healthy.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_budget_stops_pass_and_next_pass_continues() {
    let clock = MockClock::starting_now();
    let old = clock.unix_now() - 3600;
    let store = Arc::new(FlakyStore {
        delete_delay: Some(Duration::from_millis(10)),
        ..Default::default()
    });
    for i in 0..10_000 {
        store.save(&event(&format!("ev-{i}"), 24133, old)).await.unwrap();
    }

    let pruner = pruner(store.clone(), &clock);
    let cancel = CancellationToken::new();

    let first = pruner.run_pass(&cancel).await;
    assert_eq!(first.found, 10_000);
    assert!(first.budget_exhausted);
    assert!(!first.is_complete());
    assert!((2_990..=3_000).contains(&first.deleted), "deleted {}", first.deleted);
    assert_eq!(store.inner.len(), 10_000 - first.deleted);

    let second = pruner.run_pass(&cancel).await;
    assert_eq!(second.found, 10_000 - first.deleted);
    assert!(second.deleted > 0);

    let mut passes = 2;
    while !store.inner.is_empty() && passes < 10 {
        pruner.run_pass(&cancel).await;
        passes += 1;
    }
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_cancelled_pass_deletes_nothing() {
    let clock = MockClock::starting_now();
    let store = Arc::new(MemoryStore::new());
    store.save(&event("a", 24133, clock.unix_now() - 3600)).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = pruner(store.clone(), &clock).run_pass(&cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.found, 1);
    assert_eq!(report.deleted, 0);
    assert!(store.contains("a"));
}

#[tokio::test(start_paused = true)]
async fn test_pruner_task_runs_periodically_until_cancelled() {
    let clock = MockClock::starting_now();
    let store = Arc::new(MemoryStore::new());
    let pruner = Arc::new(pruner(store.clone(), &clock));
    let interval = pruner.config().interval;

    let cancel = CancellationToken::new();
    let task = spawn_pruner(Arc::clone(&pruner), cancel.clone());

    // already expired, one of the passes while we sleep removes it
    store.save(&event("a", 24133, clock.unix_now() - 3600)).await.unwrap();
    tokio::time::sleep(interval + Duration::from_secs(1)).await;
    assert!(store.is_empty());

    cancel.cancel();
    task.await.unwrap();
}
