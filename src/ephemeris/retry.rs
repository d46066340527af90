//! Serialized, bounded-retry access to an ephemeris source

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

use super::{EphemerisFix, EphemerisSource, Target, TimeWindow};
use crate::{FinderError, Result};

/// How often and how patiently a failed fetch is repeated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub initial_backoff_ms: u64,
    /// Growth factor applied to the wait after every failed attempt
    pub backoff_multiplier: f64,
    /// Upper bound on a single wait
    pub max_backoff_ms: u64,
    /// Add up to 10% random jitter to each wait
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never waits
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
            max_backoff_ms: 0,
            jitter: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(FinderError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(FinderError::Config(format!(
                "retry.backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Wait after failed attempt number `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if self.jitter && !base.is_zero() {
            let spread = rand::thread_rng().gen_range(0.0..0.1);
            base + base.mul_f64(spread)
        } else {
            base
        }
    }
}

/// Wraps a source so that fetches run one at a time with bounded retries
///
/// Workers on several threads may share one `SerializedSource`; the lock is
/// held for the whole retry sequence so the source never sees overlapping
/// requests.
#[derive(Debug)]
pub struct SerializedSource<S> {
    inner: Mutex<S>,
    policy: RetryPolicy,
}

impl<S: EphemerisSource> SerializedSource<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        SerializedSource {
            inner: Mutex::new(source),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch with retries
    ///
    /// Retryable failures are repeated with exponential backoff until the
    /// attempt budget is spent, then reported as `FinderError::RetryableFetch`
    /// carrying the attempt count. Other errors return immediately.
    pub fn fetch(&self, target: &Target, window: &TimeWindow) -> Result<EphemerisFix> {
        let mut source = self.inner.lock();
        let mut attempt = 1;
        loop {
            match source.fetch(target, window) {
                Ok(fix) => return Ok(fix),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    log::warn!(
                        "Fetch {} for {} failed (attempt {}/{}), retrying in {:?}: {}",
                        target.name,
                        window,
                        attempt,
                        self.policy.max_attempts,
                        delay,
                        err
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(FinderError::RetryableFetch { message, .. }) => {
                    return Err(FinderError::RetryableFetch {
                        target: target.name.clone(),
                        attempts: attempt,
                        message,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}
