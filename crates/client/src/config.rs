//! Configuration types for the shell client.

use crate::error::ClientResult;
use accord_shell_core::ShellConfig;
use std::time::Duration;
use url::Url;

/// License key sent with every login when none is configured
pub const DEMO_LICENSE_KEY: &str = "DEMO-LICENSE-KEY-123";

/// Configuration for the shell client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend API.
    pub base_url: Url,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry configuration.
    pub retry_config: RetryConfig,
    /// Tenant sent as `x-tenant-id` on every request.
    pub tenant_id: Option<String>,
    /// License key sent with login requests.
    pub license_key: String,
    /// Path of the login endpoint, relative to `base_url`.
    pub login_path: String,
    /// Path of the logout endpoint, relative to `base_url`.
    pub logout_path: String,
}

impl ClientConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
            tenant_id: None,
            license_key: DEMO_LICENSE_KEY.to_string(),
            login_path: "auth/login".to_string(),
            logout_path: "auth/logout".to_string(),
        }
    }

    /// Client configuration for the API of the shell's active environment
    pub fn from_shell(shell: &ShellConfig) -> ClientResult<Self> {
        let mut config = Self::new(shell.api_url("")?);
        config.login_path = shell.auth.login_path.trim_start_matches('/').to_string();
        config.logout_path = shell.auth.logout_path.trim_start_matches('/').to_string();
        Ok(config)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// HTTP status codes to retry on.
    pub retry_on_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            retry_on_status_codes: vec![429, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Create a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Backoff before retry number `attempt` (zero-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        std::cmp::min(Duration::from_millis(backoff_ms as u64), self.max_backoff)
    }

    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status_codes.contains(&status)
    }
}
