//! Authentication endpoints.

use crate::client::AccordClient;
use crate::error::{ClientError, ClientResult};
use accord_shell_core::{CredentialRecord, CredentialStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Login and logout against the auth service.
pub struct AuthApi<'a> {
    client: &'a AccordClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a AccordClient) -> Self {
        Self { client }
    }

    /// Log in and store the resulting session in `credentials`.
    ///
    /// The returned user object is decomposed into the individual credential
    /// fields; it is never stored whole. Any previous session is replaced.
    pub async fn login(
        &self,
        credentials: &CredentialStore,
        email: &str,
        password: &str,
    ) -> ClientResult<CredentialRecord> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            license_key: self.client.config().license_key.clone(),
        };

        let path = self.client.config().login_path.clone();
        let response: LoginResponse = match self.client.http.post(&path, &request, None).await {
            Ok(response) => response,
            Err(ClientError::Api {
                status, message, ..
            }) if status < 500 => return Err(ClientError::Authentication(message)),
            Err(e) => return Err(e),
        };

        let Some(token) = response.access_token.filter(|t| !t.is_empty()) else {
            return Err(ClientError::Authentication(
                response.message.unwrap_or_else(|| "Login failed".to_string()),
            ));
        };

        let mut record = response
            .user
            .as_ref()
            .map(CredentialRecord::from_user_object)
            .unwrap_or_default();
        record.token = Some(token);

        credentials.replace(&record)?;

        info!(
            user_id = record.user_id.as_deref().unwrap_or("-"),
            tenant_id = record.tenant_id.as_deref().unwrap_or("-"),
            "Logged in"
        );

        Ok(record)
    }

    /// Tell the backend the session `token` is finished.
    pub async fn logout(&self, token: &str) -> ClientResult<()> {
        let path = self.client.config().logout_path.clone();
        self.client.http.post_empty(&path, Some(token)).await
    }
}

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub license_key: String,
}

/// Login response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use accord_shell_core::storage::{CookieJar, MemoryStore};
    use accord_shell_core::CredentialField;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> CredentialStore {
        CredentialStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(CookieJar::new()),
        )
    }

    fn client(server: &MockServer) -> AccordClient {
        AccordClient::builder()
            .base_url(format!("{}/api/", server.uri()))
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_stores_decomposed_user() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({
                "email": "ada@example.com",
                "password": "secret",
                "licenseKey": "DEMO-LICENSE-KEY-123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "jwt-1",
                "user": {
                    "id": 7,
                    "name": "Ada",
                    "role": { "name": "manager" },
                    "tenantId": "t-9",
                    "permissions": ["view_leads", "view_contacts"]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = credentials();
        let record = client(&server)
            .auth()
            .login(&store, "ada@example.com", "secret")
            .await
            .unwrap();

        assert_eq!(record.token.as_deref(), Some("jwt-1"));
        assert_eq!(record.user_id.as_deref(), Some("7"));
        assert_eq!(record.role.as_deref(), Some("manager"));
        assert_eq!(store.record().unwrap(), record);
        assert_eq!(store.get(CredentialField::TenantId).unwrap().as_deref(), Some("t-9"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let store = credentials();
        let result = client(&server).auth().login(&store, "ada@example.com", "nope").await;

        assert!(matches!(result, Err(ClientError::Authentication(ref m)) if m == "Invalid credentials"));
        assert!(!store.is_authenticated().unwrap());
    }

    #[tokio::test]
    async fn test_login_without_token_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": "1"}})))
            .mount(&server)
            .await;

        let store = credentials();
        let result = client(&server).auth().login(&store, "a@b.c", "pw").await;

        assert!(matches!(result, Err(ClientError::Authentication(ref m)) if m == "Login failed"));
        assert!(store.record().unwrap().user_id.is_none());
    }

    #[tokio::test]
    async fn test_login_uses_configured_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "jwt-2"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = AccordClient::builder()
            .base_url(format!("{}/api/", server.uri()))
            .retry_config(RetryConfig::no_retry())
            .login_path("/v2/session")
            .build()
            .unwrap();

        let store = credentials();
        let record = client.auth().login(&store, "ada@example.com", "secret").await.unwrap();

        assert_eq!(record.token.as_deref(), Some("jwt-2"));
        assert!(store.is_authenticated().unwrap());
    }

    #[tokio::test]
    async fn test_logout_sends_bearer() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .and(header("Authorization", "Bearer jwt-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).auth().logout("jwt-1").await.unwrap();
    }
}
