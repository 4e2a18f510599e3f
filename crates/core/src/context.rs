//! In-process model of browsing contexts.
//!
//! A [`Browser`] hosts any number of origins. Contexts of the same origin share
//! persisted storage and broadcast channels; each context has its own session
//! storage, cookies, location and navigation log. The browser also acts as a
//! [`FrameHost`], so cross-origin clearing can run against it end to end.

use crate::broadcast::BroadcastHub;
use crate::clearer::{without_logout_marker, ClearResponder, EmbeddedFrame, FrameHost};
use crate::credentials::CredentialStore;
use crate::error::{ShellError, ShellResult};
use crate::storage::{
    CookieJar, KeyValueStore, MemoryStore, OriginStorage, RedbStore, StorageArea,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::{Origin, Url};
use uuid::Uuid;

/// Unique identifier for a browsing context (tab, window or frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Navigation performed by a context, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum NavigationEffect {
    /// History entry replaced in place, no reload
    ReplaceState(Url),
    /// In-app route change handled by the application router
    Route(String),
    /// Full page navigation
    Assign(Url),
}

/// One document: a tab, window or hidden frame
pub struct BrowsingContext {
    id: ContextId,
    origin: Origin,
    location: Mutex<Url>,
    effects: Mutex<Vec<NavigationEffect>>,
    local: StorageArea,
    session: Arc<MemoryStore>,
    cookies: Arc<CookieJar>,
    channels: Arc<BroadcastHub>,
    credentials: CredentialStore,
    drawer_open: AtomicBool,
}

impl BrowsingContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn location(&self) -> Url {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn local_storage(&self) -> &StorageArea {
        &self.local
    }

    pub fn session_storage(&self) -> &MemoryStore {
        &self.session
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn channels(&self) -> &BroadcastHub {
        &self.channels
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Replace the current history entry without reloading. Cross-origin
    /// URLs are refused, as browsers do.
    pub fn replace_state(&self, url: Url) {
        if url.origin() != self.origin {
            warn!(context = %self.id, url = %url, "Refusing cross-origin history replacement");
            return;
        }

        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = url.clone();
        self.record(NavigationEffect::ReplaceState(url));
    }

    /// In-app route change to an application-local path
    pub fn push_route(&self, path: &str) {
        {
            let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
            location.set_path(path);
            location.set_query(None);
        }
        self.record(NavigationEffect::Route(path.to_string()));
    }

    /// Full page navigation; the document is unloaded afterwards
    pub fn assign(&self, url: Url) {
        debug!(context = %self.id, url = %url, "Full page navigation");
        self.record(NavigationEffect::Assign(url));
    }

    pub fn effects(&self) -> Vec<NavigationEffect> {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_effect(&self) -> Option<NavigationEffect> {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn open_drawer(&self) {
        self.drawer_open.store(true, Ordering::SeqCst);
    }

    pub fn close_drawer(&self) {
        self.drawer_open.store(false, Ordering::SeqCst);
    }

    pub fn is_drawer_open(&self) -> bool {
        self.drawer_open.load(Ordering::SeqCst)
    }

    fn record(&self, effect: NavigationEffect) {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(effect);
    }
}

/// Where origin storage is persisted
#[derive(Debug, Clone)]
enum StorageBackend {
    Memory,
    Redb(PathBuf),
}

struct OriginState {
    storage: Arc<OriginStorage>,
    channels: Arc<BroadcastHub>,
}

/// Host for browsing contexts across any number of origins
pub struct Browser {
    backend: StorageBackend,
    origins: Mutex<HashMap<String, Arc<OriginState>>>,
    blocked: Mutex<HashSet<String>>,
}

impl Browser {
    /// Browser whose origin storage lives in memory
    pub fn in_memory() -> Self {
        Self::with_backend(StorageBackend::Memory)
    }

    /// Browser persisting each origin's storage to `<dir>/<origin>.redb`
    pub fn persistent(dir: PathBuf) -> Self {
        Self::with_backend(StorageBackend::Redb(dir))
    }

    fn with_backend(backend: StorageBackend) -> Self {
        Self {
            backend,
            origins: Mutex::new(HashMap::new()),
            blocked: Mutex::new(HashSet::new()),
        }
    }

    /// Make `origin` refuse to be embedded in frames
    pub fn block_embedding(&self, origin: &str) {
        self.blocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin.trim_end_matches('/').to_string());
    }

    fn is_blocked(&self, origin: &str) -> bool {
        self.blocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(origin)
    }

    fn origin_state(&self, origin: &Origin) -> ShellResult<Arc<OriginState>> {
        let key = origin.ascii_serialization();
        let mut origins = self.origins.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(state) = origins.get(&key) {
            return Ok(Arc::clone(state));
        }

        let backend: Arc<dyn KeyValueStore> = match &self.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Redb(dir) => Arc::new(RedbStore::new(dir.join(storage_file_name(&key)))?),
        };

        let state = Arc::new(OriginState {
            storage: Arc::new(OriginStorage::new(backend)),
            channels: Arc::new(BroadcastHub::new()),
        });
        origins.insert(key.clone(), Arc::clone(&state));

        info!(origin = %key, "Initialized origin storage");

        Ok(state)
    }

    /// Load `url` in a new browsing context.
    ///
    /// Loading migrates legacy credential state and honours the logout marker.
    pub fn open(&self, url: Url) -> ShellResult<Arc<BrowsingContext>> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(ShellError::UnsupportedOrigin(url.to_string()));
        }

        let state = self.origin_state(&origin)?;
        let id = ContextId::new();

        let local = state.storage.area(id);
        let session = Arc::new(MemoryStore::new());
        let cookies = Arc::new(CookieJar::new());
        let credentials = CredentialStore::new(
            Arc::new(local.clone()),
            session.clone(),
            cookies.clone(),
        );

        let ctx = Arc::new(BrowsingContext {
            id,
            origin,
            location: Mutex::new(url.clone()),
            effects: Mutex::new(Vec::new()),
            local,
            session,
            cookies,
            channels: Arc::clone(&state.channels),
            credentials,
            drawer_open: AtomicBool::new(false),
        });

        if let Err(e) = ctx.credentials.migrate_legacy() {
            warn!(context = %id, error = %e, "Failed to migrate legacy credentials");
        }
        if ClearResponder::new(ctx.credentials.clone()).on_load(&url) {
            ctx.replace_state(without_logout_marker(&url));
        }

        debug!(context = %id, url = %url, "Opened browsing context");

        Ok(ctx)
    }
}

fn storage_file_name(origin: &str) -> String {
    let stem: String = origin
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{stem}.redb")
}

/// Hidden frame hosted by a [`Browser`]
struct InProcessFrame {
    tx: mpsc::Sender<Value>,
    rx: mpsc::Receiver<Value>,
    task: JoinHandle<()>,
}

#[async_trait::async_trait]
impl EmbeddedFrame for InProcessFrame {
    async fn post_message(&mut self, message: Value) -> ShellResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ShellError::Frame("frame is gone".to_string()))
    }

    async fn recv_message(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    async fn teardown(self: Box<Self>) {
        self.task.abort();
    }
}

#[async_trait::async_trait]
impl FrameHost for Browser {
    async fn embed(&self, url: Url) -> ShellResult<Box<dyn EmbeddedFrame>> {
        let origin = url.origin().ascii_serialization();
        if self.is_blocked(&origin) {
            return Err(ShellError::Frame(format!("{origin} refused to be embedded")));
        }

        let ctx = self.open(url)?;
        let responder = ClearResponder::new(ctx.credentials().clone());

        let (to_frame, mut inbox) = mpsc::channel::<Value>(8);
        let (outbox, from_frame) = mpsc::channel::<Value>(8);

        let task = tokio::spawn(async move {
            let _document = ctx;
            while let Some(message) = inbox.recv().await {
                if let Some(reply) = responder.handle_message(&message) {
                    if outbox.send(reply).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Box::new(InProcessFrame {
            tx: to_frame,
            rx: from_frame,
            task,
        }))
    }
}
