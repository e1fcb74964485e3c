use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retry with exponential backoff for upstream calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// No waiting between attempts, for tests.
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }
}

/// Runs `op` until it succeeds, the error is not retryable, or the attempts run out.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
