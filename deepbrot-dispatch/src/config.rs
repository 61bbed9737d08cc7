//! Worker pool configuration.
//!
//! Every field has a default, so a config file only names what it changes:
//!
//! ```json
//! { "band_height": 16, "remote": { "base_url": "http://localhost:8080" } }
//! ```

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Words a foreign module reserves for operand staging by default.
pub const DEFAULT_ARENA_WORDS: u32 = 16 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Fixed band height. `None` sizes bands from the job.
    pub band_height: Option<u32>,
    pub retry: RetryPolicy,
    pub remote: Option<RemoteConfig>,
    pub arena_words: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            band_height: None,
            retry: RetryPolicy::default(),
            remote: None,
            arena_words: DEFAULT_ARENA_WORDS,
        }
    }
}

impl PoolConfig {
    pub fn from_json(json: &str) -> Result<Self, DispatchError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DispatchError::Config(e.to_string()))?;
        if config.band_height == Some(0) {
            return Err(DispatchError::ZeroBandHeight);
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DispatchError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json(&json)
    }
}

/// Retries for failed remote calls: `retry_limit` more attempts after the
/// first, the k-th one delayed by `k × backoff_step_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retry_limit: u32,
    pub backoff_step_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 5,
            backoff_step_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }

    /// Sum of every backoff when all attempts fail.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.retry_limit).map(|attempt| self.backoff(attempt)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL the endpoint names are appended to.
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.band_height, None);
        assert_eq!(config.retry.retry_limit, 5);
        assert_eq!(config.retry.backoff_step_ms, 1000);
        assert_eq!(config.arena_words, DEFAULT_ARENA_WORDS);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PoolConfig::from_json(
            r#"{"band_height": 16, "remote": {"base_url": "http://localhost:8080"}}"#,
        )
        .unwrap();
        assert_eq!(config.band_height, Some(16));
        assert_eq!(config.retry, RetryPolicy::default());
        let remote = config.remote.unwrap();
        assert_eq!(remote.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_band_height_is_rejected() {
        assert_eq!(
            PoolConfig::from_json(r#"{"band_height": 0}"#),
            Err(DispatchError::ZeroBandHeight)
        );
        assert!(matches!(
            PoolConfig::from_json("{"),
            Err(DispatchError::Config(_))
        ));
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(3000));
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.total_backoff(), Duration::from_secs(15));
    }
}
