use super::KeyValueStore;
use crate::context::ContextId;
use crate::error::ShellResult;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

const EVENT_CAPACITY: usize = 64;

/// Change notification for a persisted key (the browser `storage` event).
///
/// `key` is `None` when the whole area was cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub source: ContextId,
}

/// Persisted storage shared by every browsing context of one origin
pub struct OriginStorage {
    backend: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<StorageEvent>,
}

impl OriginStorage {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { backend, events }
    }

    /// Storage view for one browsing context
    pub fn area(self: &Arc<Self>, context: ContextId) -> StorageArea {
        StorageArea {
            origin: Arc::clone(self),
            context,
        }
    }

    fn publish(&self, event: StorageEvent) {
        // No receivers just means no other context is listening.
        let _ = self.events.send(event);
    }
}

/// A browsing context's handle on its origin storage.
///
/// Mutations made through an area are announced to every other area of the
/// same origin, never to the area that made them.
#[derive(Clone)]
pub struct StorageArea {
    origin: Arc<OriginStorage>,
    context: ContextId,
}

impl StorageArea {
    /// Subscribe to changes made by other contexts
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            rx: self.origin.events.subscribe(),
            own: self.context,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl KeyValueStore for StorageArea {
    fn get(&self, key: &str) -> ShellResult<Option<String>> {
        self.origin.backend.get(key)
    }

    fn set(&self, key: &str, value: &str) -> ShellResult<Option<String>> {
        let previous = self.origin.backend.set(key, value)?;
        if previous.as_deref() != Some(value) {
            self.origin.publish(StorageEvent {
                key: Some(key.to_string()),
                old_value: previous.clone(),
                new_value: Some(value.to_string()),
                source: self.context,
            });
        }
        Ok(previous)
    }

    fn remove(&self, key: &str) -> ShellResult<Option<String>> {
        let previous = self.origin.backend.remove(key)?;
        if previous.is_some() {
            self.origin.publish(StorageEvent {
                key: Some(key.to_string()),
                old_value: previous.clone(),
                new_value: None,
                source: self.context,
            });
        }
        Ok(previous)
    }

    fn clear(&self) -> ShellResult<()> {
        let had_entries = !self.origin.backend.keys()?.is_empty();
        self.origin.backend.clear()?;
        if had_entries {
            self.origin.publish(StorageEvent {
                key: None,
                old_value: None,
                new_value: None,
                source: self.context,
            });
        }
        Ok(())
    }

    fn keys(&self) -> ShellResult<Vec<String>> {
        self.origin.backend.keys()
    }
}

/// Stream of storage events caused by other contexts
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    own: ContextId,
}

impl StorageEvents {
    /// Wait for the next foreign change; `None` once the origin is gone.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.own => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Storage event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
