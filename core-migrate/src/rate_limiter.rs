//! # Rate Limiter
//!
//! Fixed-window admission control shared by every worker of a run.
//!
//! ## Overview
//!
//! The limiter keeps a request count and the start of the current one-second
//! window. [`RateLimiter::acquire`] resets the window once a second has passed,
//! sleeps until the window ends when the cap is reached, then counts the
//! caller in. The whole check, sleep and increment runs under one async mutex,
//! so callers never observe another caller's half-finished window reset.
//!
//! The cap holds per fixed window, not per sliding second: two bursts can land
//! on either side of a window boundary, admitting up to twice the cap within a
//! short span. The admitted rate stays at or below the cap on average.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

const WINDOW: Duration = Duration::from_secs(1);

/// Small buffer added to the sleep so the next check lands in a new window
const RESET_BUFFER: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request limiter
#[derive(Debug)]
pub struct RateLimiter {
    cap: u32,
    window: Mutex<Window>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `cap` requests per second
    ///
    /// A cap of zero is treated as one.
    pub fn new(cap: u32) -> Self {
        Self {
            cap: cap.max(1),
            window: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Wait until a request may be sent, then count it
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;

        let elapsed = window.started.elapsed();
        if elapsed >= WINDOW {
            window.started = Instant::now();
            window.count = 0;
        } else if window.count >= self.cap {
            let wait = WINDOW - elapsed + RESET_BUFFER;
            trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached");
            tokio::time::sleep(wait).await;
            window.started = Instant::now();
            window.count = 0;
        }

        window.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_cap_does_not_wait() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exceeding_cap_waits_for_next_window() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_callers_admit_cap_per_fixed_window() {
        let cap = 3u32;
        let limiter = Arc::new(RateLimiter::new(cap));
        let admissions = Arc::new(std::sync::Mutex::new(Vec::new()));
        let origin = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            let admissions = admissions.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..2 {
                    limiter.acquire().await;
                    admissions.lock().unwrap().push(origin.elapsed());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = admissions.lock().unwrap().clone();
        times.sort();
        assert_eq!(times.len(), 40);

        // Under saturation every reset follows a full wait, so any cap + 1
        // consecutive admissions span at least one window
        let cap = cap as usize;
        for i in 0..times.len() - cap {
            assert!(
                times[i + cap] - times[i] >= WINDOW,
                "admissions {} and {} are {:?} apart",
                i,
                i + cap,
                times[i + cap] - times[i]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bursts_on_both_sides_of_a_window_boundary() {
        let limiter = RateLimiter::new(3);
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(900)).await;
        let late = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(150)).await;
        let boundary = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }

        // Five admissions within 150ms: the cap only holds per fixed window
        assert_eq!(boundary.elapsed(), Duration::ZERO);
        assert!(boundary - late < WINDOW);
        assert_eq!(limiter.window.lock().await.count, 3);
    }

    #[test]
    fn test_zero_cap_is_clamped() {
        assert_eq!(RateLimiter::new(0).cap(), 1);
    }
}
