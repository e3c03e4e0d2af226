use std::future::Future;
use std::time::Duration;

use super::Error;

/// Linear backoff: the n-th retry waits `n * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            step: Duration::from_secs(1),
        }
    }
}

fn is_transient(err: &Error) -> bool {
    matches!(err, Error::Sqlx(_))
}

/// Run `operation` until it succeeds, fails permanently or runs out of
/// attempts.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if is_transient(&err) && attempt < policy.attempts => {
                log::warn!(
                    "{what} failed, retrying ({attempt}/{}): {err}",
                    policy.attempts
                );
                tokio::time::sleep(policy.step * attempt).await;
                attempt += 1;
            }
            Err(err) if is_transient(&err) => {
                log::error!("{what} failed after {attempt} attempts: {err}");
                return Err(err);
            }
            Err(err) => {
                log::warn!("{what} failed, not retrying: {err}");
                return Err(err);
            }
        }
    }
}
