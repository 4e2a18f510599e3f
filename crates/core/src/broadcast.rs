//! Same-origin logout propagation.
//!
//! A logout is announced on two independent channels: a named broadcast
//! channel and a write-then-delete of a sentinel key in persisted storage
//! (other contexts observe it as a storage event). Listeners subscribe to
//! both and fire once per logout.

use crate::context::{BrowsingContext, ContextId};
use crate::error::ShellResult;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Channel carrying auth notifications between same-origin contexts
pub const AUTH_CHANNEL: &str = "auth_channel";

/// Storage key written then deleted to signal a logout
pub const LOGOUT_SENTINEL_KEY: &str = "logout_event";

const CHANNEL_CAPACITY: usize = 32;

/// Message posted on a named channel
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub data: Value,
    pub source: ContextId,
}

/// Named broadcast channels shared by the contexts of one origin
#[derive(Default)]
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ChannelMessage>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<ChannelMessage> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Post `data` on `channel`, returning how many subscribers were reached
    pub fn post(&self, channel: &str, source: ContextId, data: Value) -> usize {
        self.sender(channel)
            .send(ChannelMessage { data, source })
            .unwrap_or(0)
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<ChannelMessage> {
        self.sender(channel).subscribe()
    }
}

/// Payload posted on [`AUTH_CHANNEL`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum AuthBroadcast {
    #[serde(rename = "LOGOUT")]
    Logout {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
    },
}

/// Announce a logout to every other context of the same origin.
///
/// Returns the nonce identifying this logout.
pub fn broadcast_logout(ctx: &BrowsingContext) -> ShellResult<String> {
    let nonce = Uuid::new_v4().to_string();

    let payload = serde_json::to_value(AuthBroadcast::Logout {
        nonce: Some(nonce.clone()),
    })?;
    let reached = ctx.channels().post(AUTH_CHANNEL, ctx.id(), payload);

    let storage = ctx.local_storage();
    storage.set(LOGOUT_SENTINEL_KEY, &nonce)?;
    storage.remove(LOGOUT_SENTINEL_KEY)?;

    info!(context = %ctx.id(), channel_subscribers = reached, "Broadcast logout");

    Ok(nonce)
}

/// Subscription to same-origin logout signals.
///
/// Dropping the listener cancels it.
pub struct LogoutListener {
    task: Option<JoinHandle<()>>,
}

impl LogoutListener {
    /// Unsubscribe from both channels
    pub fn cancel(mut self) {
        self.abort();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LogoutListener {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Invoke `on_logout` once for every logout broadcast by another context of
/// the same origin. Must be called from within a tokio runtime.
///
/// Both signals of one logout carry the same nonce. Signals from senders that
/// attach no nonce (a bare `LOGOUT` message, a timestamp in the sentinel) are
/// folded together when they arrive within [`UNTAGGED_LOGOUT_WINDOW`] of the
/// last delivered logout.
pub fn setup_logout_listener<F>(ctx: &BrowsingContext, on_logout: F) -> LogoutListener
where
    F: Fn() + Send + Sync + 'static,
{
    let own = ctx.id();
    let mut channel = ctx.channels().subscribe(AUTH_CHANNEL);
    let mut storage = ctx.local_storage().subscribe();

    let task = tokio::spawn(async move {
        let mut seen = RecentLogouts::default();

        loop {
            let signal = tokio::select! {
                message = channel.recv() => match message {
                    Ok(message) if message.source == own => continue,
                    Ok(message) => match serde_json::from_value::<AuthBroadcast>(message.data) {
                        Ok(AuthBroadcast::Logout { nonce }) => nonce,
                        Err(_) => continue,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Logout listener lagged behind auth channel");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = storage.recv() => match event {
                    Some(event) if event.key.as_deref() == Some(LOGOUT_SENTINEL_KEY) => {
                        match event.new_value {
                            Some(value) => Uuid::parse_str(&value).ok().map(|_| value),
                            None => continue,
                        }
                    }
                    Some(_) => continue,
                    None => break,
                },
            };

            if seen.admit(signal.as_deref(), Instant::now()) {
                debug!(context = %own, nonce = ?signal, "Received logout signal");
                on_logout();
            }
        }
    });

    LogoutListener { task: Some(task) }
}

/// Signals without a nonce arriving this soon after a delivered logout belong
/// to it
pub const UNTAGGED_LOGOUT_WINDOW: Duration = Duration::from_secs(1);

const RECENT_NONCES: usize = 16;

/// Which logouts a listener has already delivered
#[derive(Debug, Default)]
struct RecentLogouts {
    nonces: VecDeque<String>,
    last_delivered: Option<Instant>,
}

impl RecentLogouts {
    /// Whether a signal is a new logout; records it if so
    fn admit(&mut self, nonce: Option<&str>, now: Instant) -> bool {
        let fresh = match nonce {
            Some(nonce) => !self.nonces.iter().any(|n| n == nonce),
            None => self
                .last_delivered
                .map(|at| now.duration_since(at) >= UNTAGGED_LOGOUT_WINDOW)
                .unwrap_or(true),
        };

        if !fresh {
            return false;
        }

        if let Some(nonce) = nonce {
            if self.nonces.len() == RECENT_NONCES {
                self.nonces.pop_front();
            }
            self.nonces.push_back(nonce.to_string());
        }
        self.last_delivered = Some(now);

        true
    }
}
