//! Stress scheduling: weighted selection, rate limiting, concurrency.
//!
//! The scheduler owns the weighted request list, a token-bucket rate
//! limiter (rate mode only, burst 1), and the MaxVUs semaphore. During
//! ramp-up the current rate and VU count interpolate linearly from zero
//! to the target, clamped afterwards.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Token bucket with burst 1: admissions are spaced by `1/rate`.
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

struct BucketState {
    next_at: Instant,
    interval: Duration,
}

impl TokenBucket {
    pub fn new(rate: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                next_at: Instant::now(),
                interval: interval_for(rate),
            }),
        }
    }

    pub fn set_rate(&self, rate: f64) {
        self.state.lock().unwrap().interval = interval_for(rate);
    }

    /// Blocks until a token is admitted; `false` on cancellation.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let deadline = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            let at = state.next_at.max(now);
            state.next_at = at + state.interval;
            at
        };
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => true,
        }
    }
}

/// A zero or negative rate pauses admission for a long beat instead of
/// spinning; ramp ticks raise it again.
fn interval_for(rate: f64) -> Duration {
    if rate > 0.0 {
        Duration::from_secs_f64(1.0 / rate)
    } else {
        Duration::from_secs(1)
    }
}

/// Scheduler shared by the orchestrator and workers.
pub struct Scheduler {
    weights: Vec<u32>,
    total_weight: u64,
    limiter: Option<TokenBucket>,
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    target_rate: f64,
    target_vus: usize,
    ramp_up: Duration,
}

impl Scheduler {
    /// `rate` enables rate mode; otherwise `wait` is a no-op and VU
    /// pacing rules. `max_vus` bounds concurrent in-flight requests.
    pub fn new(
        weights: Vec<u32>,
        rate: Option<f64>,
        target_vus: usize,
        max_vus: usize,
        ramp_up: Duration,
    ) -> Self {
        let total_weight = weights.iter().map(|&w| w as u64).sum();
        let initial_rate = if ramp_up.is_zero() {
            rate.unwrap_or(0.0)
        } else {
            0.0
        };
        let max_permits = max_vus.max(1);
        Self {
            weights,
            total_weight,
            limiter: rate.map(|_| TokenBucket::new(initial_rate)),
            semaphore: Arc::new(Semaphore::new(max_permits)),
            max_permits,
            target_rate: rate.unwrap_or(0.0),
            target_vus,
            ramp_up,
        }
    }

    /// Waits until every concurrency slot is free again, i.e. no
    /// request is in flight. Used after cancellation to let spawned
    /// requests finish.
    pub async fn drain(&self) {
        let _ = self
            .semaphore
            .acquire_many(self.max_permits as u32)
            .await
            .expect("semaphore closed");
    }

    /// Weighted-random selection; deterministic for a single request.
    pub fn select(&self) -> usize {
        if self.weights.len() <= 1 {
            return 0;
        }
        let mut ticket = rand::thread_rng().gen_range(0..self.total_weight);
        for (index, &weight) in self.weights.iter().enumerate() {
            let weight = weight as u64;
            if ticket < weight {
                return index;
            }
            ticket -= weight;
        }
        self.weights.len() - 1
    }

    /// Rate-mode admission. `true` immediately in VU mode.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.wait(cancel).await,
            None => true,
        }
    }

    /// Cancellable concurrency-slot acquisition.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        }
    }

    /// Target rate at `elapsed`: linear during ramp-up, clamped after.
    pub fn current_rate(&self, elapsed: Duration) -> f64 {
        ramp(self.target_rate, elapsed, self.ramp_up)
    }

    /// Target VU count at `elapsed`; at least 1 once the run started.
    pub fn current_vus(&self, elapsed: Duration) -> usize {
        (ramp(self.target_vus as f64, elapsed, self.ramp_up).round() as usize).max(1)
    }

    /// Applies a recomputed rate to the limiter (ramp tick).
    pub fn update_rate(&self, rate: f64) {
        if let Some(limiter) = &self.limiter {
            limiter.set_rate(rate);
        }
    }
}

fn ramp(target: f64, elapsed: Duration, ramp_up: Duration) -> f64 {
    if ramp_up.is_zero() || elapsed >= ramp_up {
        return target;
    }
    target * elapsed.as_secs_f64() / ramp_up.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(weights: Vec<u32>) -> Scheduler {
        Scheduler::new(weights, Some(100.0), 0, 8, Duration::ZERO)
    }

    #[test]
    fn test_single_request_is_deterministic() {
        let s = scheduler(vec![5]);
        for _ in 0..20 {
            assert_eq!(s.select(), 0);
        }
    }

    #[test]
    fn test_weighted_selection_ratio() {
        let s = scheduler(vec![9, 1]);
        let mut counts = [0u32; 2];
        for _ in 0..5000 {
            counts[s.select()] += 1;
        }
        // Heavy side should dominate roughly 9:1.
        assert!(counts[0] > counts[1] * 5, "counts: {counts:?}");
    }

    #[test]
    fn test_ramp_interpolation() {
        let s = Scheduler::new(vec![1], Some(100.0), 10, 10, Duration::from_secs(10));
        assert_eq!(s.current_rate(Duration::from_secs(5)), 50.0);
        assert_eq!(s.current_rate(Duration::from_secs(20)), 100.0);
        assert_eq!(s.current_vus(Duration::from_secs(5)), 5);
        assert_eq!(s.current_vus(Duration::from_secs(10)), 10);
        // Never below one worker once running.
        assert_eq!(s.current_vus(Duration::ZERO), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_spacing() {
        let bucket = TokenBucket::new(10.0); // one token per 100ms
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        for _ in 0..5 {
            assert!(bucket.wait(&cancel).await);
        }
        // First token is immediate; four more at 100ms spacing.
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_wait_cancellation() {
        let bucket = TokenBucket::new(0.001);
        let cancel = CancellationToken::new();
        assert!(bucket.wait(&cancel).await); // immediate first token
        cancel.cancel();
        assert!(!bucket.wait(&cancel).await);
    }

    #[tokio::test]
    async fn test_acquire_respects_cancellation() {
        let s = Scheduler::new(vec![1], None, 1, 1, Duration::ZERO);
        let cancel = CancellationToken::new();
        let permit = s.acquire(&cancel).await;
        assert!(permit.is_some());
        // Slot is taken; a cancelled acquire must return None.
        cancel.cancel();
        assert!(s.acquire(&cancel).await.is_none());
        drop(permit);
    }

    #[tokio::test]
    async fn test_vu_mode_wait_is_noop() {
        let s = Scheduler::new(vec![1], None, 4, 4, Duration::ZERO);
        let cancel = CancellationToken::new();
        assert!(s.wait(&cancel).await);
    }
}
