use serde::{Deserialize, Serialize};
use std::time::Duration;
use streamkv_common::serializer::{duration_ms, opt_duration_ms};

pub const DEFAULT_USER_AGENT: &str = concat!("streamkv-client/", env!("CARGO_PKG_VERSION"));

/// Exponential backoff between attempts of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Upper bound on attempts, `None` retries until the deadline
    pub max_attempts: Option<u32>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub app_profile_id: String,
    /// Overall deadline of one logical operation, retries included
    #[serde(with = "opt_duration_ms")]
    pub timeout: Option<Duration>,
    pub retry: RetrySettings,
    pub user_agent: String,
    pub api_client: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_profile_id: String::new(),
            timeout: None,
            retry: RetrySettings::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_client: format!("streamkv-rust/{}", streamkv_common::VERSION),
        }
    }
}

impl ClientConfig {
    pub fn with_app_profile(mut self, app_profile_id: impl Into<String>) -> Self {
        self.app_profile_id = app_profile_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(1));
        assert!(config.timeout.is_none());
        assert!(config.user_agent.starts_with("streamkv-client/"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"app_profile_id": "p", "timeout": 2000}"#).unwrap();
        assert_eq!(config.app_profile_id, "p");
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.retry, RetrySettings::default());
    }
}
