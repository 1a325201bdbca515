use std::future::Future;

use tracing::{debug, warn};

use crate::policy::RetryPolicy;

/// Runs `op` under `policy`, sleeping between attempts with the
/// jittered exponential delay (§4.6). `classify` decides, for each error
/// `op` returns, whether the retryer should give up immediately
/// (`NonRetryable`) or try again (`Retryable`) — callers typically build
/// this from `RetryPolicy::is_non_retryable` plus any type-specific checks.
///
/// On success, returns the produced value. On a non-retryable error or on
/// exhausting `max_attempts`, returns the last error.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, classify: impl Fn(&E) -> Classification, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.effective_max_attempts();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if matches!(classify(&err), Classification::NonRetryable) {
                    warn!(target: "retry", "non-retryable error on attempt {attempt}: {err}");
                    return Err(err);
                }
                if attempt >= max_attempts {
                    warn!(target: "retry", "exhausted {max_attempts} attempts, last error: {err}");
                    return Err(err);
                }
                let delay = policy.jittered_delay_for_attempt(attempt);
                debug!(target: "retry", "attempt {attempt} failed ({err}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Convenience wrapper that classifies purely via
/// `RetryPolicy::is_non_retryable` against the error's `Display` text —
/// the common case for REST/WebSocket errors surfaced as strings.
pub async fn retry_by_message<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry(
        policy,
        |err| {
            if policy.is_non_retryable(&err.to_string()) {
                Classification::NonRetryable
            } else {
                Classification::Retryable
            }
        },
        &mut op,
    )
    .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    NonRetryable,
}
