//! Retry state machine for extraction requests
//!
//! A [`RetryState`] counts attempts and turns each failure into a
//! [`RetryDecision`]: try again after a delay, or give up with a terminal error.
//! The decision logic is synchronous and clock-free so budgets and delays can be
//! tested without sleeping; [`retry`] is the async driver.

use crate::config::RetryConfig;
use crate::domain::ExtractError;
use crate::log_retry_attempt;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay, server hints included
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Randomize each computed delay into `[delay/2, delay]`
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy from the `[fhir.retry]` section, with jitter enabled
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
            jitter: true,
        }
    }

    /// Same policy with deterministic delays
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Backoff before retry number `retry` (0-based), before jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// What to do after a failed attempt
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt` (1-based)
    Retry {
        /// Number of the next attempt
        attempt: u32,
        /// Time to wait first
        delay: Duration,
    },
    /// Stop; the error is terminal for this request
    GiveUp(ExtractError),
}

/// Attempt counter for one logical request
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    /// Fresh state; no attempt made yet
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and decide what happens next
    ///
    /// Non-transient errors end immediately. Transient errors are retried until
    /// the attempt budget is spent, after which the last one is wrapped in
    /// [`ExtractError::RetriesExhausted`]. A server `Retry-After` hint longer
    /// than the computed backoff replaces it, capped at `max_delay`.
    pub fn on_failure(&mut self, error: ExtractError) -> RetryDecision {
        self.attempts += 1;

        if !error.is_transient() {
            return RetryDecision::GiveUp(error);
        }
        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::GiveUp(ExtractError::RetriesExhausted {
                attempts: self.attempts,
                last: Box::new(error),
            });
        }

        let mut delay = self.policy.backoff(self.attempts - 1);
        if self.policy.jitter && !delay.is_zero() {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay = delay.mul_f64(factor);
        }
        if let Some(hint) = error.retry_after() {
            delay = delay.max(hint.min(self.policy.max_delay));
        }

        RetryDecision::Retry {
            attempt: self.attempts + 1,
            delay,
        }
    }
}

/// Run `operation` until it succeeds or the policy gives up
///
/// # Errors
///
/// Returns the first non-transient error, or `RetriesExhausted` wrapping the
/// last transient one.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let mut state = RetryState::new(policy.clone());
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let reason = error.to_string();
                match state.on_failure(error) {
                    RetryDecision::Retry { attempt, delay } => {
                        log_retry_attempt!(attempt, policy.max_attempts, delay, reason);
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp(error) => return Err(error),
                }
            }
        }
    }
}
