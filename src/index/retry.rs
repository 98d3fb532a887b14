//! Backoff-and-retry for remote fetches.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::core::SourceKind;
use crate::error::{IndexError, Result};

/// Retry configuration for remote sources.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// No retries and no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    ///
    /// A rate-limit reset that comes sooner than the backoff shortens the
    /// wait; nothing waits longer than `max_delay_ms`.
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32, error: &IndexError) -> Duration {
        let base = self.base_delay_ms as f64;
        let exp_delay = base * 2_f64.powi(attempt.saturating_sub(1) as i32);
        let capped = exp_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let mut delay = Duration::from_millis((capped + jitter).max(0.0) as u64);

        if let IndexError::RateLimited {
            reset_at: Some(reset),
            ..
        } = error
        {
            if let Ok(until_reset) = (*reset - Utc::now()).to_std() {
                delay = delay.min(until_reset);
            } else {
                delay = Duration::ZERO;
            }
        }
        delay.min(Duration::from_millis(self.max_delay_ms))
    }
}

/// Run `op`, retrying transient failures per `config`.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    source: SourceKind,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.calculate_delay(attempt, &err);
                warn!(
                    source = %source,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Remote fetch failed; retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                debug!(source = %source, operation, attempt, error = %err, "Giving up");
                return Err(err);
            }
        }
    }
}
