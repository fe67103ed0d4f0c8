//! Sliding-window admission control.
//!
//! Keeps the timestamps of admitted requests for the last hour and admits a
//! new request only while both the per-minute and the per-hour windows have
//! room. Pruning happens lazily on every check; nothing runs in the
//! background.
//!
//! Time is read from `tokio::time::Instant`, so tests running on a paused
//! Tokio clock can move the windows with `tokio::time::advance`. Every
//! operation also has an `_at` variant taking an explicit `now`.

use callmeter_config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Two-window sliding rate limiter.
///
/// Thread-safe via a single `Mutex` around the timestamp queue. The lock is
/// only held for bookkeeping, never across an await point.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: usize,
    requests_per_hour: usize,
    enabled: bool,
    /// Admission times, oldest first. Never longer than `requests_per_hour`.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create an enabled limiter with the given caps.
    pub fn new(requests_per_minute: u32, requests_per_hour: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute as usize,
            requests_per_hour: requests_per_hour as usize,
            enabled: true,
            timestamps: Mutex::new(VecDeque::with_capacity(requests_per_hour as usize)),
        }
    }

    /// Create a limiter from the `[rate_limit]` config section.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let mut limiter = Self::new(config.requests_per_minute, config.requests_per_hour);
        limiter.enabled = config.enabled;
        limiter
    }

    pub fn requests_per_minute(&self) -> usize {
        self.requests_per_minute
    }

    pub fn requests_per_hour(&self) -> usize {
        self.requests_per_hour
    }

    /// Whether a request could be admitted right now.
    pub fn can_make_request(&self) -> bool {
        self.can_make_request_at(Instant::now())
    }

    pub fn can_make_request_at(&self, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }
        let mut timestamps = self.lock();
        prune(&mut timestamps, now);
        self.has_room(&timestamps, now)
    }

    /// Record an admitted request at the current time.
    pub fn record_request(&self) {
        self.record_request_at(Instant::now());
    }

    pub fn record_request_at(&self, now: Instant) {
        let mut timestamps = self.lock();
        self.push(&mut timestamps, now);
    }

    /// Time until the oldest entry of the minute window expires.
    ///
    /// Zero when nothing was admitted during the last 60 seconds.
    pub fn wait_time(&self) -> Duration {
        self.wait_time_at(Instant::now())
    }

    pub fn wait_time_at(&self, now: Instant) -> Duration {
        let timestamps = self.lock();
        minute_wait(&timestamps, now)
    }

    /// Check and record in one critical section.
    ///
    /// Returns `Err(wait)` with the current [`wait_time`](Self::wait_time)
    /// when the request is not admitted.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut timestamps = self.lock();
        if self.enabled {
            prune(&mut timestamps, now);
            if !self.has_room(&timestamps, now) {
                return Err(minute_wait(&timestamps, now));
            }
        }
        self.push(&mut timestamps, now);
        Ok(())
    }

    /// How long until a request could be admitted.
    ///
    /// Unlike [`wait_time`](Self::wait_time) this also covers a full hour
    /// window: the larger of the minute wait and the time until the oldest
    /// retained entry leaves the hour. Zero when a request would be admitted.
    pub fn retry_after(&self) -> Duration {
        self.retry_after_at(Instant::now())
    }

    pub fn retry_after_at(&self, now: Instant) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let mut timestamps = self.lock();
        prune(&mut timestamps, now);
        if self.has_room(&timestamps, now) {
            return Duration::ZERO;
        }

        let minute = if count_within(&timestamps, now, MINUTE) >= self.requests_per_minute {
            minute_wait(&timestamps, now)
        } else {
            Duration::ZERO
        };
        let hour = match timestamps.front() {
            Some(&oldest) if timestamps.len() >= self.requests_per_hour => {
                HOUR.saturating_sub(now.saturating_duration_since(oldest))
            }
            _ => Duration::ZERO,
        };
        minute.max(hour)
    }

    /// Requests admitted during the last 60 seconds.
    pub fn in_last_minute(&self) -> usize {
        self.in_last_minute_at(Instant::now())
    }

    pub fn in_last_minute_at(&self, now: Instant) -> usize {
        count_within(&self.lock(), now, MINUTE)
    }

    /// Requests admitted during the last hour.
    pub fn in_last_hour(&self) -> usize {
        self.in_last_hour_at(Instant::now())
    }

    pub fn in_last_hour_at(&self, now: Instant) -> usize {
        count_within(&self.lock(), now, HOUR)
    }

    fn has_room(&self, timestamps: &VecDeque<Instant>, now: Instant) -> bool {
        count_within(timestamps, now, MINUTE) < self.requests_per_minute
            && timestamps.len() < self.requests_per_hour
    }

    fn push(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while timestamps.len() >= self.requests_per_hour.max(1) {
            timestamps.pop_front();
        }
        timestamps.push_back(now);
    }

    // The queue is valid after every push/pop, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

/// Drop entries that have left the hour window.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = timestamps.front() {
        if now.saturating_duration_since(oldest) >= HOUR {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

fn count_within(timestamps: &VecDeque<Instant>, now: Instant, window: Duration) -> usize {
    timestamps
        .iter()
        .filter(|&&t| now.saturating_duration_since(t) < window)
        .count()
}

fn minute_wait(timestamps: &VecDeque<Instant>, now: Instant) -> Duration {
    timestamps
        .iter()
        .map(|&t| now.saturating_duration_since(t))
        .filter(|age| *age < MINUTE)
        .max()
        .map(|oldest_age| MINUTE.saturating_sub(oldest_age))
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn minute_cap_then_window_expiry() {
        let limiter = RateLimiter::new(3, 100);
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(limiter.can_make_request_at(t0 + secs(i)));
            limiter.record_request_at(t0 + secs(i));
        }
        assert!(!limiter.can_make_request_at(t0 + secs(10)));
        assert_eq!(limiter.in_last_minute_at(t0 + secs(10)), 3);

        // Entries leave the minute window once they are 60s old.
        assert!(limiter.can_make_request_at(t0 + secs(61)));
        assert_eq!(limiter.in_last_minute_at(t0 + secs(61)), 1);
    }

    #[test]
    fn hour_cap_and_pruning() {
        let limiter = RateLimiter::new(100, 3);
        let t0 = Instant::now();

        for i in 0..3 {
            limiter.record_request_at(t0 + secs(i * 120));
        }
        // Minute window is clear but the hour is full.
        assert!(!limiter.can_make_request_at(t0 + secs(600)));
        assert_eq!(limiter.in_last_hour_at(t0 + secs(600)), 3);

        // The first entry is older than an hour and gets pruned.
        assert!(limiter.can_make_request_at(t0 + secs(3601)));
        assert_eq!(limiter.in_last_hour_at(t0 + secs(3601)), 2);
    }

    #[test]
    fn wait_time_tracks_oldest_minute_entry() {
        let limiter = RateLimiter::new(2, 100);
        let t0 = Instant::now();
        assert_eq!(limiter.wait_time_at(t0), Duration::ZERO);

        limiter.record_request_at(t0);
        limiter.record_request_at(t0 + secs(5));
        assert_eq!(limiter.wait_time_at(t0 + secs(20)), secs(40));

        // Only the t0+5 entry is still inside the minute window.
        assert_eq!(limiter.wait_time_at(t0 + secs(60)), secs(5));
        assert_eq!(limiter.wait_time_at(t0 + secs(70)), Duration::ZERO);
    }

    #[test]
    fn try_acquire_reports_wait() {
        let limiter = RateLimiter::new(1, 10);
        let t0 = Instant::now();

        assert!(limiter.try_acquire_at(t0).is_ok());
        let wait = limiter.try_acquire_at(t0 + secs(15)).unwrap_err();
        assert_eq!(wait, secs(45));
        assert!(limiter.try_acquire_at(t0 + secs(60)).is_ok());
    }

    #[test]
    fn retry_after_covers_a_full_hour_window() {
        let limiter = RateLimiter::new(1, 1);
        let t0 = Instant::now();
        assert_eq!(limiter.retry_after_at(t0), Duration::ZERO);

        limiter.record_request_at(t0);
        // Both windows are full: the hour wait dominates.
        assert_eq!(limiter.retry_after_at(t0 + secs(10)), secs(3590));

        // The minute window is empty, so wait_time alone says zero.
        let now = t0 + secs(120);
        assert_eq!(limiter.wait_time_at(now), Duration::ZERO);
        assert!(limiter.try_acquire_at(now).is_err());
        assert_eq!(limiter.retry_after_at(now), secs(3480));

        // Admitted again exactly when the entry leaves the hour window.
        assert!(limiter.try_acquire_at(t0 + secs(3600)).is_ok());
    }

    #[test]
    fn retry_after_for_minute_cap_only() {
        let limiter = RateLimiter::new(1, 100);
        let t0 = Instant::now();
        limiter.record_request_at(t0);
        assert_eq!(limiter.retry_after_at(t0 + secs(15)), secs(45));
    }

    #[test]
    fn timestamps_bounded_by_hourly_cap() {
        let limiter = RateLimiter::new(1000, 5);
        let t0 = Instant::now();
        for i in 0..20 {
            limiter.record_request_at(t0 + Duration::from_millis(i));
        }
        assert_eq!(limiter.in_last_hour_at(t0 + secs(1)), 5);
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let limiter = RateLimiter::from_config(&RateLimitConfig {
            enabled: false,
            requests_per_minute: 1,
            requests_per_hour: 1,
        });
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(limiter.try_acquire_at(t0 + secs(i)).is_ok());
        }
        assert!(limiter.can_make_request_at(t0 + secs(10)));
    }

    #[test]
    fn concurrent_acquire_never_oversubscribes() {
        let limiter = Arc::new(RateLimiter::new(100, 1000));
        let now = Instant::now();

        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    s.spawn(move || (0..50).filter(|_| limiter.try_acquire_at(now).is_ok()).count())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_clock_moves_the_window() {
        let limiter = RateLimiter::new(1, 10);
        assert!(limiter.try_acquire().is_ok());
        assert!(!limiter.can_make_request());

        tokio::time::advance(secs(61)).await;
        assert!(limiter.can_make_request());
        assert_eq!(limiter.wait_time(), Duration::ZERO);
    }
}
