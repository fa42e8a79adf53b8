//! Retry policy and failure classification.
//!
//! Classification is pure: it only looks at a [`NormalizedResult`], so it can
//! be tested without a service behind it.

use crate::normalizer::{ErrorKind, NormalizedResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What a failed call means for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    /// Worth retrying: timeouts, connection errors, 408, 429, 5xx
    Transient,
    /// Retrying will not help; the operation fails and the run continues
    Permanent,
    /// The checkpoint is gone; the run must stop
    ResourceMissing,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
            FailureClass::ResourceMissing => "resource-missing",
        })
    }
}

/// Classifies a result. Returns `None` for successes.
pub fn classify(result: &NormalizedResult) -> Option<FailureClass> {
    if result.ok {
        return None;
    }
    let class = match result.error_kind {
        Some(
            ErrorKind::Timeout
            | ErrorKind::ConnectionFailed
            | ErrorKind::Transport
            | ErrorKind::RateLimited
            | ErrorKind::ServerError,
        ) => FailureClass::Transient,
        Some(ErrorKind::NotFound) => FailureClass::ResourceMissing,
        Some(ErrorKind::ClientError | ErrorKind::RemoteError | ErrorKind::UnrecognizedResponse) | None => {
            FailureClass::Permanent
        }
    };
    Some(class)
}

/// Exponential backoff with jitter.
///
/// The delay before retry `n` (1-based) is `base * multiplier^(n-1)`, capped
/// at `max_delay_ms`, then spread by up to `jitter` in either direction. A
/// server-provided retry-after hint is a floor for the delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per operation, the first one included
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    pub multiplier: f64,

    pub max_delay_ms: u64,

    /// Fraction of the delay used as random spread (0.3 = ±30%)
    pub jitter: f64,

    pub honor_retry_after: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> f64 {
    0.3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            honor_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Whether another attempt is allowed after `attempts` failed ones.
    pub fn should_retry(&self, attempts: u32, class: FailureClass) -> bool {
        class == FailureClass::Transient && attempts < self.max_attempts
    }

    /// Backoff before retry number `retry` (1-based), without hints.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let spread = if jitter > 0.0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        let delayed = (capped * (1.0 + spread)).clamp(0.0, self.max_delay_ms as f64);
        Duration::from_millis(delayed.round() as u64)
    }

    /// Delay before retry number `retry`, honoring a retry-after hint.
    pub fn delay(&self, retry: u32, retry_after_seconds: Option<u64>) -> Duration {
        let backoff = self.backoff(retry);
        match retry_after_seconds {
            Some(seconds) if self.honor_retry_after => backoff.max(Duration::from_secs(seconds)),
            _ => backoff,
        }
    }
}
