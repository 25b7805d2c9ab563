//! Pull configuration.
//!
//! # Design
//! All fields have defaults so a device can ship an empty `{}` config, or
//! none at all, and still pull. Limits replace the fixed-size buffers of
//! earlier firmware: anything longer is rejected before a byte is sent
//! rather than silently truncated.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stall::StallPolicy;

pub const DEFAULT_USER_AGENT: &str = concat!("pull-ota/", env!("CARGO_PKG_VERSION"));

/// Upper bounds on the pieces that go into a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    pub max_host_len: usize,
    /// Path plus `?` plus query.
    pub max_target_len: usize,
    /// `username:password` before base64, or the bearer token.
    pub max_credentials_len: usize,
    pub max_token_len: usize,
    pub max_request_len: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_host_len: 255,
            max_target_len: 1024,
            max_credentials_len: 512,
            max_token_len: 127,
            max_request_len: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    pub user_agent: String,
    /// Sent as `Authorization: Bearer`; wins over credentials in the URL.
    pub bearer_token: Option<String>,
    /// Bytes pulled from the connection per flash write.
    pub chunk_size: usize,
    pub connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Empty reads tolerated in a row before the stream counts as stalled.
    pub max_idle_polls: u32,
    pub limits: RequestLimits,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            bearer_token: None,
            chunk_size: 1024,
            connect_timeout_ms: 10_000,
            idle_timeout_ms: 30_000,
            poll_interval_ms: 10,
            max_idle_polls: 3000,
            limits: RequestLimits::default(),
        }
    }
}

impl PullConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn stall_policy(&self) -> StallPolicy {
        StallPolicy {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_idle_polls: self.max_idle_polls,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = PullConfig::from_json("{}").unwrap();
        assert_eq!(config, PullConfig::default());
        assert_eq!(config.chunk_size, 1024);
        assert!(config.bearer_token.is_none());
    }

    #[test]
    fn partial_limits_keep_other_defaults() {
        let config = PullConfig::from_json(r#"{"bearer_token":"abc","limits":{"max_host_len":64}}"#).unwrap();
        assert_eq!(config.bearer_token.as_deref(), Some("abc"));
        assert_eq!(config.limits.max_host_len, 64);
        assert_eq!(config.limits.max_request_len, 2048);
    }

    #[test]
    fn stall_policy_uses_millisecond_fields() {
        let config = PullConfig {
            idle_timeout_ms: 1500,
            poll_interval_ms: 0,
            max_idle_polls: 40,
            ..PullConfig::default()
        };
        let policy = config.stall_policy();
        assert_eq!(policy.idle_timeout, Duration::from_millis(1500));
        assert!(policy.poll_interval.is_zero());
        assert_eq!(policy.max_idle_polls, 40);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(PullConfig::from_json(r#"{"chunk_size":"big"}"#).is_err());
    }
}
