//! Backend client.

use crate::api::AuthApi;
use crate::config::{ClientConfig, RetryConfig, DEMO_LICENSE_KEY};
use crate::error::{ClientError, ClientResult};
use crate::transport::HttpTransport;
use accord_shell_core::ShellConfig;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Client for the Accord backend API.
#[derive(Clone)]
pub struct AccordClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl AccordClient {
    pub fn builder() -> AccordClientBuilder {
        AccordClientBuilder::new()
    }

    fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    /// Client for the API of the shell's active environment
    pub fn from_shell_config(shell: &ShellConfig) -> ClientResult<Self> {
        Self::from_config(ClientConfig::from_shell(shell)?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Authentication endpoints
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }
}

/// Builder for [`AccordClient`].
pub struct AccordClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    retry_config: RetryConfig,
    tenant_id: Option<String>,
    license_key: String,
    login_path: Option<String>,
    logout_path: Option<String>,
}

impl AccordClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
            tenant_id: None,
            license_key: DEMO_LICENSE_KEY.to_string(),
            login_path: None,
            logout_path: None,
        }
    }

    /// Base URL of the backend API.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    pub fn license_key(mut self, key: impl Into<String>) -> Self {
        self.license_key = key.into();
        self
    }

    /// Login endpoint, relative to the base URL
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    /// Logout endpoint, relative to the base URL
    pub fn logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = Some(path.into());
        self
    }

    pub fn build(self) -> ClientResult<AccordClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Config("base_url is required".to_string()))?;

        let mut config = ClientConfig::new(Url::parse(&base_url)?);
        config.timeout = self.timeout;
        config.retry_config = self.retry_config;
        config.tenant_id = self.tenant_id;
        config.license_key = self.license_key;
        if let Some(path) = self.login_path {
            config.login_path = path.trim_start_matches('/').to_string();
        }
        if let Some(path) = self.logout_path {
            config.logout_path = path.trim_start_matches('/').to_string();
        }

        AccordClient::from_config(config)
    }
}

impl Default for AccordClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let result = AccordClient::builder().build();
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let result = AccordClient::builder().base_url("not a url").build();
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_builder_settings() {
        let client = AccordClient::builder()
            .base_url("https://api.tclaccord.com/")
            .tenant_id("t-1")
            .license_key("LIVE-KEY")
            .login_path("/session/start")
            .logout_path("/session/end")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let config = client.config();
        assert_eq!(config.tenant_id.as_deref(), Some("t-1"));
        assert_eq!(config.license_key, "LIVE-KEY");
        assert_eq!(config.login_path, "session/start");
        assert_eq!(config.logout_path, "session/end");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
