//! Clock abstraction for testable timing.
//!
//! Backoff, rate limiting, and timestamp recording all go through `Clock`
//! so tests can drive time deterministically instead of sleeping.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

/// Time source injected into every time-dependent component.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Current wall-clock time for timestamps.
    fn now_system(&self) -> SystemTime;

    /// Sleeps for the given duration. Production maps to
    /// `tokio::time::sleep`; a test clock advances virtual time instead.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Current wall-clock time as a chrono timestamp.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.now_system())
    }
}

/// Production clock backed by system time and tokio sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Controllable clock for deterministic tests.
///
/// Monotonic and system time advance together through `advance`; sleeping
/// on this clock advances time immediately rather than blocking.
#[derive(Debug, Clone)]
pub struct TestClock {
    monotonic_ns: Arc<AtomicU64>,
    system_ns: Arc<AtomicU64>,
    base_instant: Instant,
}

impl TestClock {
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Creates a test clock whose system time starts at `start`.
    pub fn with_start_time(start: SystemTime) -> Self {
        let since_epoch = start.duration_since(UNIX_EPOCH).unwrap_or_default();

        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_ns: Arc::new(AtomicU64::new(
                u64::try_from(since_epoch.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0),
            )),
            base_instant: Instant::now(),
        }
    }

    /// Advances both clocks by the given duration.
    pub fn advance(&self, duration: Duration) {
        let duration_ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);
        self.monotonic_ns.fetch_add(duration_ns, Ordering::AcqRel);
        self.system_ns.fetch_add(duration_ns, Ordering::AcqRel);
    }

    /// Elapsed virtual time since clock creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.monotonic_ns.load(Ordering::Acquire))
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        let elapsed_ns = self.monotonic_ns.load(Ordering::Acquire);
        self.base_instant + Duration::from_nanos(elapsed_ns)
    }

    fn now_system(&self) -> SystemTime {
        let ns = self.system_ns.load(Ordering::Acquire);
        UNIX_EPOCH + Duration::from_nanos(ns)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        // Yield so other tasks observe the advanced time.
        Box::pin(tokio::task::yield_now())
    }
}
