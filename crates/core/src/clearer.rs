//! Cross-origin credential clearing.
//!
//! Every micro-frontend origin keeps its own credential store, so a logout on
//! one origin has to ask the others to clear theirs. Each known origin is
//! loaded in a hidden embedded frame carrying the `logout=true` marker and is
//! sent an explicit `CLEAR_AUTH_DATA` message. The exchange is best-effort:
//! an origin that is offline or refuses embedding simply stays uncleared.

use crate::credentials::CredentialStore;
use crate::error::{ShellError, ShellResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// URL marker asking a freshly loaded document to clear its credentials
pub const LOGOUT_MARKER: &str = "logout";

/// Default time an origin gets to confirm before its frame is torn down
pub const DEFAULT_CLEAR_TIMEOUT: Duration = Duration::from_millis(500);

/// Messages exchanged with embedded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum FrameMessage {
    #[serde(rename = "CLEAR_AUTH_DATA")]
    ClearAuthData,
    #[serde(rename = "AUTH_DATA_CLEARED")]
    AuthDataCleared,
}

impl FrameMessage {
    pub fn to_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse a posted message; unknown payloads yield `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Host able to embed another origin in a hidden frame
#[async_trait::async_trait]
pub trait FrameHost: Send + Sync {
    /// Load `url` in a new hidden frame
    async fn embed(&self, url: Url) -> ShellResult<Box<dyn EmbeddedFrame>>;
}

/// A hidden embedded browsing context
#[async_trait::async_trait]
pub trait EmbeddedFrame: Send {
    /// Post a cross-origin message into the frame
    async fn post_message(&mut self, message: Value) -> ShellResult<()>;

    /// Next message posted back by the frame; `None` once it is gone
    async fn recv_message(&mut self) -> Option<Value>;

    /// Remove the frame
    async fn teardown(self: Box<Self>);
}

/// Result of clearing one origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ClearOutcome {
    Confirmed,
    TimedOut,
    Failed(String),
}

/// Per-origin outcomes of a clear fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub outcomes: Vec<(String, ClearOutcome)>,
}

impl ClearReport {
    pub fn outcome(&self, origin: &str) -> Option<&ClearOutcome> {
        self.outcomes
            .iter()
            .find(|(o, _)| o == origin)
            .map(|(_, outcome)| outcome)
    }

    pub fn confirmed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == ClearOutcome::Confirmed)
            .count()
    }

    pub fn all_confirmed(&self) -> bool {
        self.confirmed() == self.outcomes.len()
    }
}

/// Fans a clear request out to every known origin
#[derive(Clone)]
pub struct CrossOriginClearer {
    host: Arc<dyn FrameHost>,
    timeout: Duration,
}

impl CrossOriginClearer {
    pub fn new(host: Arc<dyn FrameHost>) -> Self {
        Self {
            host,
            timeout: DEFAULT_CLEAR_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask every origin to clear its credentials.
    ///
    /// All origins are attempted concurrently and each is bounded by the
    /// timeout. Never fails: unreachable origins are reported and logged.
    pub async fn clear_all_origins(&self, origins: &[Url]) -> ClearReport {
        let mut seen = BTreeSet::new();
        let targets: Vec<Url> = origins
            .iter()
            .filter(|url| seen.insert(url.origin().ascii_serialization()))
            .cloned()
            .collect();

        let attempts = targets.into_iter().map(|origin| {
            let host = Arc::clone(&self.host);
            let timeout = self.timeout;
            async move {
                let name = origin.origin().ascii_serialization();
                let outcome = clear_origin(host.as_ref(), &origin, timeout).await;
                match &outcome {
                    ClearOutcome::Confirmed => debug!(origin = %name, "Origin cleared"),
                    ClearOutcome::TimedOut => {
                        warn!(origin = %name, "Origin did not confirm clear before timeout")
                    }
                    ClearOutcome::Failed(reason) => {
                        warn!(origin = %name, reason = %reason, "Failed to clear origin")
                    }
                }
                (name, outcome)
            }
        });

        let report = ClearReport {
            outcomes: futures::future::join_all(attempts).await,
        };

        info!(
            origins = report.outcomes.len(),
            confirmed = report.confirmed(),
            "Cross-origin clear settled"
        );

        report
    }
}

/// URL loaded in the hidden frame for `origin`
pub fn clear_url(origin: &Url) -> ShellResult<Url> {
    let mut url = origin.join("/")?;
    url.query_pairs_mut().append_pair(LOGOUT_MARKER, "true");
    Ok(url)
}

/// `url` without the logout marker, other parameters kept in order
pub fn without_logout_marker(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != LOGOUT_MARKER)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    stripped.set_query(None);
    if !kept.is_empty() {
        stripped.query_pairs_mut().extend_pairs(kept);
    }
    stripped
}

async fn clear_origin(host: &dyn FrameHost, origin: &Url, timeout: Duration) -> ClearOutcome {
    let deadline = Instant::now() + timeout;

    let url = match clear_url(origin) {
        Ok(url) => url,
        Err(e) => return ClearOutcome::Failed(e.to_string()),
    };

    let mut frame = match tokio::time::timeout_at(deadline, host.embed(url)).await {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => return ClearOutcome::Failed(e.to_string()),
        Err(_) => return ClearOutcome::TimedOut,
    };

    let exchange = async {
        frame
            .post_message(FrameMessage::ClearAuthData.to_value())
            .await?;

        while let Some(reply) = frame.recv_message().await {
            if FrameMessage::from_value(&reply) == Some(FrameMessage::AuthDataCleared) {
                return Ok(());
            }
        }

        Err(ShellError::Frame(
            "frame closed before confirming".to_string(),
        ))
    };

    let outcome = match tokio::time::timeout_at(deadline, exchange).await {
        Ok(Ok(())) => ClearOutcome::Confirmed,
        Ok(Err(e)) => ClearOutcome::Failed(e.to_string()),
        Err(_) => ClearOutcome::TimedOut,
    };

    frame.teardown().await;

    outcome
}

/// The receiving side of a cross-origin clear, run by every origin
#[derive(Clone)]
pub struct ClearResponder {
    credentials: CredentialStore,
}

impl ClearResponder {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }

    /// Clear at load time when the document URL carries the logout marker.
    /// Returns whether a clear happened.
    pub fn on_load(&self, location: &Url) -> bool {
        let marked = location
            .query_pairs()
            .any(|(k, v)| k == LOGOUT_MARKER && v == "true");

        if marked {
            self.clear();
        }

        marked
    }

    /// Handle a posted message, returning the reply to send back
    pub fn handle_message(&self, message: &Value) -> Option<Value> {
        match FrameMessage::from_value(message)? {
            FrameMessage::ClearAuthData => {
                self.clear();
                Some(FrameMessage::AuthDataCleared.to_value())
            }
            FrameMessage::AuthDataCleared => None,
        }
    }

    fn clear(&self) {
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear credentials on request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Browser;
    use crate::credentials::CredentialField;
    use serde_json::json;
    use tokio::sync::mpsc;

    /// Frame host whose frames never answer
    struct SilentHost;

    struct SilentFrame {
        _keepalive: mpsc::Sender<Value>,
        rx: mpsc::Receiver<Value>,
    }

    #[async_trait::async_trait]
    impl EmbeddedFrame for SilentFrame {
        async fn post_message(&mut self, _message: Value) -> ShellResult<()> {
            Ok(())
        }

        async fn recv_message(&mut self) -> Option<Value> {
            self.rx.recv().await
        }

        async fn teardown(self: Box<Self>) {}
    }

    #[async_trait::async_trait]
    impl FrameHost for SilentHost {
        async fn embed(&self, _url: Url) -> ShellResult<Box<dyn EmbeddedFrame>> {
            let (tx, rx) = mpsc::channel(1);
            Ok(Box::new(SilentFrame {
                _keepalive: tx,
                rx,
            }))
        }
    }

    /// Routes one origin to a silent frame and everything else to a browser
    struct MixedHost {
        browser: Arc<Browser>,
        silent_origin: String,
    }

    #[async_trait::async_trait]
    impl FrameHost for MixedHost {
        async fn embed(&self, url: Url) -> ShellResult<Box<dyn EmbeddedFrame>> {
            if url.origin().ascii_serialization() == self.silent_origin {
                SilentHost.embed(url).await
            } else {
                self.browser.embed(url).await
            }
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_frame_message_wire_format() {
        assert_eq!(
            FrameMessage::ClearAuthData.to_value(),
            json!({ "action": "CLEAR_AUTH_DATA" })
        );
        assert_eq!(
            FrameMessage::from_value(&json!({ "action": "AUTH_DATA_CLEARED" })),
            Some(FrameMessage::AuthDataCleared)
        );
        assert_eq!(FrameMessage::from_value(&json!({ "action": "LOGOUT" })), None);
    }

    #[test]
    fn test_clear_url() {
        let u = clear_url(&url("https://sale.tclaccord.com/sales/leads?x=1")).unwrap();
        assert_eq!(u.as_str(), "https://sale.tclaccord.com/?logout=true");
    }

    #[test]
    fn test_without_logout_marker() {
        let stripped =
            without_logout_marker(&url("https://sale.tclaccord.com/leads?page=2&logout=true&q=a%20b"));
        assert_eq!(stripped.as_str(), "https://sale.tclaccord.com/leads?page=2&q=a+b");

        let bare = without_logout_marker(&url("https://sale.tclaccord.com/?logout=true"));
        assert_eq!(bare.as_str(), "https://sale.tclaccord.com/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_origin_does_not_block_responding_origin() {
        let browser = Arc::new(Browser::in_memory());
        let responding = browser.open(url("https://sale.tclaccord.com/sales/leads")).unwrap();
        responding
            .credentials()
            .set(CredentialField::Token, "tok")
            .unwrap();

        let host = Arc::new(MixedHost {
            browser: browser.clone(),
            silent_origin: "https://offline.tclaccord.com".to_string(),
        });
        let clearer = CrossOriginClearer::new(host).with_timeout(Duration::from_millis(500));

        let started = Instant::now();
        let report = clearer
            .clear_all_origins(&[
                url("https://offline.tclaccord.com"),
                url("https://sale.tclaccord.com"),
            ])
            .await;

        assert!(started.elapsed() <= Duration::from_millis(500));
        assert_eq!(
            report.outcome("https://offline.tclaccord.com"),
            Some(&ClearOutcome::TimedOut)
        );
        assert_eq!(
            report.outcome("https://sale.tclaccord.com"),
            Some(&ClearOutcome::Confirmed)
        );
        assert!(!report.all_confirmed());
        assert_eq!(responding.credentials().get(CredentialField::Token).unwrap(), None);
    }

    #[tokio::test]
    async fn test_blocked_embedding_is_reported_not_fatal() {
        let browser = Arc::new(Browser::in_memory());
        browser.block_embedding("https://token.tclaccord.com");
        let clearer = CrossOriginClearer::new(browser.clone());

        let report = clearer
            .clear_all_origins(&[
                url("https://token.tclaccord.com"),
                url("https://token.tclaccord.com/tickets"),
                url("https://asset.tclaccord.com"),
            ])
            .await;

        assert_eq!(report.outcomes.len(), 2);
        assert!(matches!(
            report.outcome("https://token.tclaccord.com"),
            Some(ClearOutcome::Failed(_))
        ));
        assert_eq!(
            report.outcome("https://asset.tclaccord.com"),
            Some(&ClearOutcome::Confirmed)
        );
    }

    #[tokio::test]
    async fn test_responder() {
        let browser = Browser::in_memory();
        let ctx = browser.open(url("https://members.tclaccord.com/users")).unwrap();
        ctx.credentials().set(CredentialField::Token, "tok").unwrap();
        let responder = ClearResponder::new(ctx.credentials().clone());

        assert!(!responder.on_load(&url("https://members.tclaccord.com/users?logout=false")));
        assert!(ctx.credentials().is_authenticated().unwrap());

        assert_eq!(responder.handle_message(&json!({ "action": "PING" })), None);
        assert_eq!(
            responder.handle_message(&FrameMessage::ClearAuthData.to_value()),
            Some(FrameMessage::AuthDataCleared.to_value())
        );
        assert!(!ctx.credentials().is_authenticated().unwrap());

        ctx.credentials().set(CredentialField::Token, "again").unwrap();
        assert!(responder.on_load(&url("https://members.tclaccord.com/?logout=true")));
        assert!(!ctx.credentials().is_authenticated().unwrap());
    }
}
