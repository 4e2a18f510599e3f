//! Full logout sequence.

use crate::client::AccordClient;
use crate::error::ClientResult;
use accord_shell_core::broadcast::broadcast_logout;
use accord_shell_core::clearer::{ClearReport, CrossOriginClearer, FrameHost};
use accord_shell_core::{BrowsingContext, CredentialField, ShellConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Bound on the backend logout call
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(3);

/// What each logout step achieved
#[derive(Debug, Clone, Serialize)]
pub struct LogoutReport {
    /// Whether the backend acknowledged the logout
    pub server_notified: bool,
    /// Nonce of the same-origin broadcast, if it went out
    pub broadcast_nonce: Option<String>,
    /// Whether the local credential store was cleared
    pub cleared_locally: bool,
    /// Per-origin results of the cross-origin clear
    pub cross_origin: ClearReport,
    /// Where the context was sent
    pub redirect: Url,
}

/// Logs a context out everywhere.
///
/// Every step is best-effort; the final redirect to sign-in always happens.
pub struct LogoutFlow {
    client: AccordClient,
    clearer: CrossOriginClearer,
    origins: Vec<Url>,
    sign_in_url: Url,
    server_timeout: Duration,
}

impl LogoutFlow {
    pub fn new(
        client: AccordClient,
        clearer: CrossOriginClearer,
        origins: Vec<Url>,
        sign_in_url: Url,
    ) -> Self {
        Self {
            client,
            clearer,
            origins,
            sign_in_url,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
        }
    }

    /// Flow over every origin the shell configuration knows about
    pub fn from_shell_config(
        shell: &ShellConfig,
        client: AccordClient,
        host: Arc<dyn FrameHost>,
    ) -> ClientResult<Self> {
        Ok(Self::new(
            client,
            CrossOriginClearer::new(host).with_timeout(shell.clear_timeout()),
            shell.known_origins()?,
            shell.sign_in_url().clone(),
        ))
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    pub fn origins(&self) -> &[Url] {
        &self.origins
    }

    /// Log `ctx` out: notify the backend, tell same-origin contexts, clear
    /// local credentials, clear every other origin, then go to sign-in.
    pub async fn run(&self, ctx: &BrowsingContext) -> LogoutReport {
        let server_notified = self.notify_server(ctx).await;

        let broadcast_nonce = match broadcast_logout(ctx) {
            Ok(nonce) => Some(nonce),
            Err(e) => {
                warn!(context = %ctx.id(), error = %e, "Failed to broadcast logout");
                None
            }
        };

        let cleared_locally = match ctx.credentials().clear() {
            Ok(()) => true,
            Err(e) => {
                warn!(context = %ctx.id(), error = %e, "Failed to clear local credentials");
                false
            }
        };

        let others: Vec<Url> = self
            .origins
            .iter()
            .filter(|origin| origin.origin() != *ctx.origin())
            .cloned()
            .collect();
        let cross_origin = self.clearer.clear_all_origins(&others).await;

        let redirect = self.sign_in_url.clone();
        ctx.assign(redirect.clone());

        info!(
            context = %ctx.id(),
            server_notified,
            origins_confirmed = cross_origin.confirmed(),
            origins_total = cross_origin.outcomes.len(),
            "Logged out"
        );

        LogoutReport {
            server_notified,
            broadcast_nonce,
            cleared_locally,
            cross_origin,
            redirect,
        }
    }

    async fn notify_server(&self, ctx: &BrowsingContext) -> bool {
        let token = match ctx.credentials().get(CredentialField::Token) {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(context = %ctx.id(), "No session token, skipping backend logout");
                return false;
            }
            Err(e) => {
                warn!(context = %ctx.id(), error = %e, "Failed to read session token");
                return false;
            }
        };

        match tokio::time::timeout(self.server_timeout, self.client.auth().logout(&token)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Backend logout failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.server_timeout.as_millis(),
                    "Backend logout timed out"
                );
                false
            }
        }
    }
}
