//! Retry-until-satisfied recovery primitive.
//!
//! A [`RecoveryRule`] repeatedly observes a value, checks it against a
//! constraint and, while the constraint fails, runs a corrective action
//! (typically a re-download). Unlike a plain retry it does not care whether
//! the action "succeeded": only the observed value decides.
//!
//! The loop is bounded by a [`RecoveryPolicy`] and escalates to
//! [`Error::RetryExhausted`] instead of spinning forever. An optional
//! [`CancellationToken`] aborts the loop, its backoff sleeps and the
//! in-flight recovery action with [`Error::Cancelled`].

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Bounds and pacing of a recovery loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Maximum number of recovery actions before giving up (at least one is made).
    pub max_attempts: u32,
    /// Delay before the second recovery action.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Give up once this much time has passed, regardless of attempts.
    pub max_elapsed_secs: Option<u64>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
            max_elapsed_secs: None,
        }
    }
}

impl RecoveryPolicy {
    /// Policy with `max_attempts` attempts and no delay between them.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            max_elapsed_secs: None,
        }
    }

    /// Set the attempt bound.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_secs.map(Duration::from_secs)
    }

    fn backoff(&self) -> impl Backoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.max_backoff_ms))
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None) // bounded by max_attempts / max_elapsed_secs instead
            .build()
    }
}

/// Strategy object guarding a value with a constraint and a recovery action.
///
/// * `supplier` produces a fresh observation on every iteration
/// * `constraint` decides whether the observation is acceptable
/// * `recovery` performs the corrective side effect
///
/// Transient recovery failures ([`Error::is_transient`]) are absorbed and the
/// loop continues; any other failure is returned immediately.
pub struct RecoveryRule<S, P, R> {
    operation: String,
    supplier: S,
    constraint: P,
    recovery: R,
    policy: RecoveryPolicy,
    cancel: Option<CancellationToken>,
}

impl<T, S, P, R, Fut> RecoveryRule<S, P, R>
where
    S: FnMut() -> T,
    P: Fn(&T) -> bool,
    R: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    /// Create a rule with the default policy.
    pub fn new(operation: impl Into<String>, supplier: S, constraint: P, recovery: R) -> Self {
        Self {
            operation: operation.into(),
            supplier,
            constraint,
            recovery,
            policy: RecoveryPolicy::default(),
            cancel: None,
        }
    }

    /// Replace the loop bounds.
    #[must_use]
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort the loop when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the loop until the constraint holds, the bound is hit, or the
    /// token is cancelled.
    pub async fn apply(mut self) -> Result<T> {
        let started = Instant::now();
        let max_elapsed = self.policy.max_elapsed();
        let mut backoff = self.policy.backoff();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts: u32 = 0;
        let mut last_error = String::from("constraint not satisfied");

        loop {
            self.check_cancelled()?;

            let value = (self.supplier)();
            if (self.constraint)(&value) {
                if attempts > 0 {
                    debug!(
                        operation = %self.operation,
                        attempts,
                        "Constraint satisfied after recovery"
                    );
                }
                return Ok(value);
            }

            let timed_out = max_elapsed.is_some_and(|max| started.elapsed() >= max);
            if attempts >= max_attempts || timed_out {
                warn!(
                    operation = %self.operation,
                    attempts,
                    error = %last_error,
                    "Recovery exhausted"
                );
                return Err(Error::retry_exhausted(self.operation, attempts, last_error));
            }

            if attempts > 0
                && let Some(delay) = backoff.next_backoff()
            {
                warn!(
                    operation = %self.operation,
                    attempts,
                    error = %last_error,
                    retry_in_ms = delay.as_millis(),
                    "Constraint not satisfied, retrying"
                );
                self.sleep(delay).await?;
            }

            attempts += 1;
            let outcome = match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return Err(Error::cancelled(&self.operation)),
                        result = (self.recovery)() => result,
                    }
                }
                None => (self.recovery)().await,
            };

            match outcome {
                Ok(()) => last_error = String::from("constraint not satisfied after recovery"),
                Err(e) if e.is_transient() => last_error = e.to_string(),
                Err(e) => return Err(e),
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Error::cancelled(&self.operation)),
            _ => Ok(()),
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<()> {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    () = token.cancelled() => Err(Error::cancelled(&self.operation)),
                    () = tokio::time::sleep(delay) => Ok(()),
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}
