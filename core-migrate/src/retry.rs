//! # Retry Policies
//!
//! Retry decisions for the two transport shapes a worker drives.
//!
//! ## Overview
//!
//! - [`TwoPhaseRetry`]: apply/commit calls are repeated only while the failure
//!   carries no request id. A request id means the remote side registered the
//!   call and repeating it could duplicate the side effect.
//! - [`RetryPolicy`]: single rate-limited calls are repeated with capped
//!   exponential backoff, stopping immediately on input or permanent failures
//!   and when a cooperative deadline has passed.
//!
//! Both are pure functions of the classified [`TransferError`]; the callers own
//! the sleeping.

use bridge_traits::{TransferError, TransferErrorKind};
use std::time::Duration;

/// Error code recorded when the cooperative deadline stops the retry loop
pub const INTERNAL_TIMEOUT: &str = "INTERNAL_TIMEOUT";

/// Error code recorded when the outer deadline abandons a task
pub const THREAD_POOL_TIMEOUT: &str = "THREAD_POOL_TIMEOUT";

/// Error code recorded when a worker task panicked
pub const TASK_EXECUTION_ERROR: &str = "TASK_EXECUTION_ERROR";

// ============================================================================
// Two-phase protocol
// ============================================================================

/// Retry rule for apply/commit calls
#[derive(Debug, Clone, Copy)]
pub struct TwoPhaseRetry {
    /// Total calls allowed, including the first
    pub max_attempts: u32,
}

impl Default for TwoPhaseRetry {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl TwoPhaseRetry {
    /// Whether another call may follow `attempts` failed ones ending in `error`
    pub fn should_retry(&self, error: &TransferError, attempts: u32) -> bool {
        attempts < self.max_attempts
            && !error.reached_remote()
            && error.kind != TransferErrorKind::InvalidInput
    }
}

// ============================================================================
// Rate-limited single call
// ============================================================================

/// What the paced retry loop should do after a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then call again
    Retry(Duration),
    /// Surface the error as is
    GiveUp,
}

/// Retry policy for the single-call, rate-limited protocol
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first call
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Cooperative bound on the whole loop
    pub internal_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            internal_deadline: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_internal_deadline(mut self, deadline: Duration) -> Self {
        self.internal_deadline = deadline;
        self
    }

    /// Backoff before retry number `retry` (zero based): `min(base * 2^retry, max)`
    ///
    /// With the default 2 second base the waits are 2s, 4s, 8s and so on, i.e.
    /// `2^attempt` seconds for one-based attempt numbers.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether the error class may ever be retried
    pub fn is_retryable(error: &TransferError) -> bool {
        matches!(
            error.kind,
            TransferErrorKind::Transient | TransferErrorKind::Timeout
        )
    }

    /// Decide what follows a failure after `retries_used` retries
    pub fn decide(&self, error: &TransferError, retries_used: u32) -> RetryDecision {
        if !Self::is_retryable(error) || retries_used >= self.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.backoff(retries_used))
        }
    }

    /// Whether `elapsed` has passed the cooperative deadline
    pub fn deadline_passed(&self, elapsed: Duration) -> bool {
        elapsed > self.internal_deadline
    }

    /// Error reported when the cooperative deadline stops the loop
    pub fn timeout_error(&self, elapsed: Duration) -> TransferError {
        TransferError::timeout(
            INTERNAL_TIMEOUT,
            format!(
                "retries abandoned after {:.1}s (limit {}s)",
                elapsed.as_secs_f64(),
                self.internal_deadline.as_secs()
            ),
        )
    }
}
