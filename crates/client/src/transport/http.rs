//! HTTP transport with retries.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP transport for backend requests.
///
/// The session token is not part of the transport: each call passes the
/// bearer token read from the credential store at that moment.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    pub fn new(config: Arc<ClientConfig>) -> ClientResult<Self> {
        let mut headers = header::HeaderMap::new();

        if let Some(ref tenant_id) = config.tenant_id {
            headers.insert(
                header::HeaderName::from_static("x-tenant-id"),
                header::HeaderValue::from_str(tenant_id)
                    .map_err(|_| ClientError::Config("Invalid tenant ID format".to_string()))?,
            );
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_url(&self, path: &str) -> ClientResult<url::Url> {
        Ok(self.config.base_url.join(path)?)
    }

    fn authorize(builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        match bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute_with_retry(&self, request_builder: RequestBuilder) -> ClientResult<Response> {
        let retry_config = &self.config.retry_config;
        let mut attempts = 0;

        loop {
            let request = request_builder
                .try_clone()
                .ok_or_else(|| ClientError::Config("Request cannot be cloned".to_string()))?;

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if attempts < retry_config.max_retries
                        && retry_config.should_retry_status(status)
                    {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            status,
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(ClientError::from_response(status, &body));
                }
                Err(e) => {
                    if attempts < retry_config.max_retries && e.is_timeout() {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            "Request timed out, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(ClientError::Timeout);
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> ClientResult<T> {
        let url = self.build_url(path)?;
        debug!(url = %url, "POST request");

        let builder = Self::authorize(self.client.post(url).json(body), bearer);
        let response = self.execute_with_retry(builder).await?;
        Ok(response.json().await?)
    }

    /// POST without a body, ignoring whatever the server answers with.
    pub async fn post_empty(&self, path: &str, bearer: Option<&str>) -> ClientResult<()> {
        let url = self.build_url(path)?;
        debug!(url = %url, "POST request (no body)");

        let builder = Self::authorize(self.client.post(url), bearer);
        self.execute_with_retry(builder).await?;
        Ok(())
    }
}
