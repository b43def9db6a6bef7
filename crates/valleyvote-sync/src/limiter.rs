//! Shared request limiter: bounded in-flight requests and a minimum, jittered
//! gap between request starts.

use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use valleyvote_core::RateLimitConfig;

use crate::error::FetchError;

#[derive(Debug)]
pub struct RateLimiter {
    in_flight: Semaphore,
    last_start: Mutex<Option<Instant>>,
    min_interval: Duration,
    jitter_below: Duration,
    jitter_above: Duration,
}

/// Held for the duration of one request.
#[derive(Debug)]
pub struct RatePermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            in_flight: Semaphore::new(config.max_in_flight.max(1)),
            last_start: Mutex::new(None),
            min_interval: Duration::from_millis(config.min_interval_ms),
            jitter_below: Duration::from_millis(config.jitter_below_ms),
            jitter_above: Duration::from_millis(config.jitter_above_ms),
        }
    }

    /// No spacing and no concurrency bound beyond `max_in_flight`.
    pub fn unlimited(max_in_flight: usize) -> Self {
        Self::new(&RateLimitConfig {
            min_interval_ms: 0,
            jitter_below_ms: 0,
            jitter_above_ms: 0,
            max_in_flight,
        })
    }

    /// Wait for a request slot. Cancellation aborts the wait.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<RatePermit<'_>, FetchError> {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = self.in_flight.acquire() => permit.map_err(|_| FetchError::Cancelled)?,
        };

        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.next_gap();
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep_until(ready_at) => {}
            }
        }
        *last = Some(Instant::now());

        Ok(RatePermit { _permit: permit })
    }

    /// Minimum interval plus a random offset, never negative.
    fn next_gap(&self) -> Duration {
        if self.jitter_below.is_zero() && self.jitter_above.is_zero() {
            return self.min_interval;
        }
        let below = self.jitter_below.as_millis() as i64;
        let above = self.jitter_above.as_millis() as i64;
        let offset = rand::rng().random_range(-below..=above);
        let gap = self.min_interval.as_millis() as i64 + offset;
        Duration::from_millis(gap.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(min_interval_ms: u64, max_in_flight: usize) -> RateLimitConfig {
        RateLimitConfig {
            min_interval_ms,
            jitter_below_ms: 0,
            jitter_above_ms: 0,
            max_in_flight,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_request_starts() {
        let limiter = RateLimiter::new(&config(1_000, 4));
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..3 {
            let _p = limiter.acquire(&cancel).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_across_tasks() {
        let limiter = Arc::new(RateLimiter::new(&config(100, 2)));
        let cancel = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let base = Instant::now();

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let (limiter, cancel) = (limiter.clone(), cancel.clone());
                let (in_flight, peak) = (in_flight.clone(), peak.clone());
                tokio::spawn(async move {
                    let _p = limiter.acquire(&cancel).await.unwrap();
                    let started = base.elapsed();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    started
                })
            })
            .collect();
        let mut starts = Vec::new();
        for task in tasks {
            starts.push(task.await.unwrap());
        }
        starts.sort();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100), "{starts:?}");
        }
        // Two slots held for 500ms each: six requests need three rounds.
        assert!(starts[5] >= Duration::from_millis(1_000), "{starts:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_not_delayed() {
        let limiter = RateLimiter::new(&config(5_000, 1));
        let start = Instant::now();
        let _p = limiter.acquire(&CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_wait() {
        let limiter = RateLimiter::new(&config(60_000, 2));
        let cancel = CancellationToken::new();
        drop(limiter.acquire(&cancel).await.unwrap());
        cancel.cancel();
        assert_eq!(limiter.acquire(&cancel).await.unwrap_err(), FetchError::Cancelled);
    }

    #[test]
    fn jitter_stays_in_range() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        for _ in 0..200 {
            let gap = limiter.next_gap();
            assert!(gap >= Duration::from_millis(900) && gap <= Duration::from_millis(1_500), "{gap:?}");
        }
    }
}
