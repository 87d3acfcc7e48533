use std::time::Duration;

use crate::knowledge::RetryPolicy;

/// Explicit runtime configuration with documented defaults.
///
/// Passed to construction instead of read from process-wide globals. Env
/// overrides (loaded through `dotenvy`, so a `.env` file works too):
/// `MURMURATION_MAX_SESSION_RETRIES`, `MURMURATION_RETRY_BACKOFF_MS`.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Retry budget of the optimistic session loop. Default 8.
    pub max_session_retries: usize,
    /// Base backoff between session retries (doubling, jittered, capped).
    /// Default 2 ms.
    pub retry_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        let defaults = RetryPolicy::default();
        RuntimeConfig {
            max_session_retries: env_usize("MURMURATION_MAX_SESSION_RETRIES")
                .unwrap_or(defaults.max_retries),
            retry_backoff: env_usize("MURMURATION_RETRY_BACKOFF_MS")
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or(defaults.backoff_base),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_max_session_retries(mut self, retries: usize) -> Self {
        self.max_session_retries = retries;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_session_retries,
            backoff_base: self.retry_backoff,
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}
