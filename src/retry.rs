use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// Failure of one outbound summarizer call.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("network error: {0}")]
    Network(String),
    #[error("summarizer returned status {0}")]
    Status(u16),
    #[error("summarizer credential not configured")]
    NotConfigured,
}

impl CallError {
    /// Permanent errors short-circuit the retry loop.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CallError::NotConfigured)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Delay before the attempt after `attempt`:
/// `min(max_delay, base_delay * 2^(attempt-1))` scaled by `jitter`.
/// Callers draw the jitter uniformly from [0.5, 1.5); tests pass it fixed.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, jitter: f64) -> Duration {
    let exp = policy.base_delay.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
    Duration::from_secs_f64(exp.min(policy.max_delay.as_secs_f64()) * jitter)
}

/// Run `op` up to `policy.max_attempts` times, sleeping the backoff delay
/// between attempts. Exhausting the ceiling returns the final error; the
/// caller pattern-matches on the result rather than catching anything.
pub fn with_retries<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, CallError>
where
    F: FnMut(u32) -> Result<T, CallError>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if e.is_permanent() || attempt >= policy.max_attempts.max(1) => {
                return Err(e);
            }
            Err(e) => {
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let delay = backoff_delay(policy, attempt, jitter);
                tracing::warn!(
                    "summarizer call failed (attempt {}/{}): {} - retrying in {:.1}s",
                    attempt,
                    policy.max_attempts,
                    e,
                    delay.as_secs_f64()
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
