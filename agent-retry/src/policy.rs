use std::time::Duration;

use agent_core::RetryConfig;
use rand::Rng;

/// Parameters for the exponential retryer (§4.6), used both for control
/// channel reconnects and for token-fetch retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub geometric_ratio: f64,
    pub jitter_ratio: f64,
    pub max_attempts: u32,
    /// Substrings that mark an error as non-retryable; matched against the
    /// error's `Display` output.
    pub non_retryable_substrings: Vec<String>,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            initial_delay_ms: cfg.initial_delay_ms,
            max_delay_ms: cfg.max_delay_ms,
            geometric_ratio: cfg.geometric_ratio,
            jitter_ratio: cfg.jitter_ratio,
            max_attempts: cfg.max_attempts,
            non_retryable_substrings: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn with_non_retryable(mut self, substrings: impl IntoIterator<Item = String>) -> Self {
        self.non_retryable_substrings = substrings.into_iter().collect();
        self
    }

    /// `true` when `message` matches one of the configured non-retryable
    /// substrings.
    pub fn is_non_retryable(&self, message: &str) -> bool {
        self.non_retryable_substrings.iter().any(|s| message.contains(s.as_str()))
    }

    /// The total attempt cap this policy allows. `0` is clamped to `1` so a
    /// retryer configured with `max_attempts = 0` still runs the callable
    /// exactly once (§8).
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// `clamp(initialDelay × ratio^attempt, ≤ maxDelay)`, with no jitter
    /// applied — this is the pure, deterministic part of §4.6's formula,
    /// split out so the monotonicity property in §8 is directly testable.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.initial_delay_ms as f64 * self.geometric_ratio.powi(attempt as i32);
        let clamped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(clamped as u64)
    }

    /// `delay_for_attempt` plus uniform jitter in `[0, delay × jitterRatio)`.
    pub fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter_ratio <= 0.0 {
            return base;
        }
        let max_jitter_ms = (base.as_millis() as f64 * self.jitter_ratio).max(0.0);
        let jitter_ms = if max_jitter_ms > 0.0 {
            rand::thread_rng().gen_range(0.0..max_jitter_ms)
        } else {
            0.0
        };
        base + Duration::from_millis(jitter_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            geometric_ratio: 2.0,
            jitter_ratio: 0.0,
            max_attempts: 5,
            non_retryable_substrings: Vec::new(),
        }
    }

    #[test]
    fn delay_is_monotonically_non_decreasing_up_to_max() {
        let p = policy();
        let delays: Vec<_> = (0..8).map(|n| p.delay_for_attempt(n)).collect();
        for window in delays.windows(2) {
            assert!(window[1] >= window[0]);
        }
        assert_eq!(*delays.last().unwrap(), Duration::from_millis(1_000));
    }

    #[test]
    fn zero_max_attempts_is_clamped_to_one() {
        let mut p = policy();
        p.max_attempts = 0;
        assert_eq!(p.effective_max_attempts(), 1);
    }

    #[test]
    fn non_retryable_substring_matches() {
        let p = policy().with_non_retryable(["AccessDenied".to_string()]);
        assert!(p.is_non_retryable("401 AccessDenied: bad token"));
        assert!(!p.is_non_retryable("timeout"));
    }

    #[test]
    fn jitter_keeps_delay_within_expected_band() {
        let p = RetryPolicy {
            jitter_ratio: 0.5,
            ..policy()
        };
        let base = p.delay_for_attempt(1);
        for _ in 0..50 {
            let jittered = p.jittered_delay_for_attempt(1);
            assert!(jittered >= base);
            assert!(jittered <= base + base.mul_f64(0.5) + Duration::from_millis(1));
        }
    }
}
