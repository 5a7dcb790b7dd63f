use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic session clock.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync + std::fmt::Debug;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
}

/// Wall-clock timer backed by [`Instant`]; timestamps are nanoseconds since creation.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    pub start: Instant,
}

impl Timer for SessionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
}

impl SessionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer that only moves when told to.
///
/// Clones share the same clock, so a simulated rig can advance time while
/// the session reads it.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
}

impl Timer for ManualTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        let ns = d.as_nanos().min(u64::MAX as u128) as u64;
        self.now_ns.fetch_add(ns, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: f64) {
        if secs.is_finite() && secs > 0.0 {
            self.advance(Duration::from_secs_f64(secs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_clones_share_time() {
        let timer = ManualTimer::new();
        let start = timer.now();
        let handle = timer.clone();
        handle.advance(Duration::from_secs(90 * 60));
        assert_eq!(timer.elapsed(start), Duration::from_secs(5400));
        handle.advance_secs(f64::NAN);
        assert_eq!(timer.elapsed(start), Duration::from_secs(5400));
    }

    #[test]
    fn session_timer_is_monotonic() {
        let timer = SessionTimer::new();
        let a = timer.now();
        let b = timer.now();
        assert!(b >= a);
        assert!(timer.elapsed(b) <= timer.elapsed(a));
    }
}
