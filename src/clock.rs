use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// Source of time for the limiter (monotonic) and for record ages (unix seconds)
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;

    fn unix_now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Controllable clock for tests.
///
/// Clones share the same time, so advancing one advances all of them. Both
/// readings move together: `advance(60s)` moves `now()` by 60 seconds and
/// `unix_now()` by 60.
#[derive(Debug, Clone)]
pub struct MockClock {
    inner: Arc<Mutex<MockTime>>,
}

#[derive(Debug)]
struct MockTime {
    instant: Instant,
    // sub-second remainder so that advancing by millis eventually moves unix time
    unix_millis: i64,
}

impl MockClock {
    pub fn new(start: Instant, unix_start: i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTime {
                instant: start,
                unix_millis: unix_start * 1000,
            })),
        }
    }

    // starts at the real current time
    pub fn starting_now() -> Self {
        Self::new(Instant::now(), chrono::Utc::now().timestamp())
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        time.instant += by;
        time.unix_millis += by.as_millis() as i64;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).instant
    }

    fn unix_now(&self) -> i64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unix_millis
            .div_euclid(1000)
    }
}
