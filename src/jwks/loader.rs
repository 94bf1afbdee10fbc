//! JWKS loader (C6): maintains the current key set for an issuer, refreshing
//! it on change and exposing keys by `kid`.
//!
//! Modeled as a closed tagged union of the four flavors the spec names,
//! rather than a trait object hierarchy (see §9's polymorphism guidance).
//! Concurrent [`JwksLoader::init_async`] calls share one `tokio::sync::OnceCell`
//! completion, matching the reference stack's idiom for dedup'd async init
//! (`turbomcp_auth`'s `OnceCell<String>` for cached discovery, generalized
//! here to the whole load).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex as AsyncMutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::counter::SecurityEventCounter;
use crate::error::ValidationEventType;
use crate::http_handler::{ContentConverter, HttpHandlerConfig, ResilientHttpHandler};
use crate::http_result::{ErrorCategory, HttpResultState};
use crate::jwks::parser::{self, KeyInfo, DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_MAX_KEYS};
use crate::jwks::well_known;

/// Observable lifecycle state of a JWKS source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
    Undefined,
    Loading,
    Ok,
    Error,
}

struct LoaderSnapshot {
    keys: HashMap<String, KeyInfo>,
    etag: Option<String>,
    status: LoaderStatus,
}

impl LoaderSnapshot {
    fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            etag: None,
            status: LoaderStatus::Undefined,
        }
    }
}

struct JwksConverter {
    max_document_bytes: usize,
    max_keys: usize,
    counter: Arc<SecurityEventCounter>,
}

impl ContentConverter<HashMap<String, KeyInfo>> for JwksConverter {
    fn convert(&self, bytes: &[u8]) -> Result<HashMap<String, KeyInfo>, String> {
        let parsed = parser::parse_with_limits(bytes, self.max_document_bytes, self.max_keys)
            .map_err(|e| e.to_string())?;
        if parsed.kid_collisions > 0 {
            self.counter.increment(ValidationEventType::JwksKidCollision);
        }
        Ok(parsed.keys)
    }
}

/// Tunables shared by the file, inline, and HTTP-backed loader flavors.
#[derive(Debug, Clone)]
pub struct JwksLoaderConfig {
    pub max_document_bytes: usize,
    pub max_keys: usize,
    pub refresh_interval: Duration,
    pub http: HttpHandlerConfig,
}

impl Default for JwksLoaderConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_keys: DEFAULT_MAX_KEYS,
            refresh_interval: Duration::from_secs(600),
            http: HttpHandlerConfig::default(),
        }
    }
}

async fn fetch_and_swap(
    state: &RwLock<LoaderSnapshot>,
    handler: &ResilientHttpHandler<HashMap<String, KeyInfo>>,
    counter: &SecurityEventCounter,
) -> LoaderStatus {
    let (current_etag, had_keys_already) = {
        let guard = state.read().await;
        (guard.etag.clone(), guard.status == LoaderStatus::Ok)
    };
    let result = handler.load(current_etag.as_deref()).await;

    if result.state != HttpResultState::Valid {
        let (category, detail) = result
            .error
            .map(|e| (Some(e.category), e.detail))
            .unwrap_or((None, String::new()));
        warn!(error = %detail, "JWKS fetch failed");
        let event = match category {
            Some(ErrorCategory::InvalidContent) if detail.contains("zero keys") => {
                ValidationEventType::JwksEmptyKeySet
            }
            Some(ErrorCategory::InvalidContent) => ValidationEventType::JwksParseFailed,
            _ => ValidationEventType::JwksLoadFailed,
        };
        counter.increment(event);
        let mut guard = state.write().await;
        guard.status = LoaderStatus::Error;
        return LoaderStatus::Error;
    }

    if result.unchanged {
        debug!("JWKS unchanged (304)");
        counter.increment(ValidationEventType::JwksRefreshUnchanged);
        let mut guard = state.write().await;
        guard.status = LoaderStatus::Ok;
        return LoaderStatus::Ok;
    }

    let Some(keys) = result.content else {
        counter.increment(ValidationEventType::JwksLoadFailed);
        let mut guard = state.write().await;
        guard.status = LoaderStatus::Error;
        return LoaderStatus::Error;
    };

    counter.increment(if had_keys_already {
        ValidationEventType::JwksRefreshed
    } else {
        ValidationEventType::JwksLoadSuccess
    });
    let mut guard = state.write().await;
    guard.keys = keys;
    guard.etag = result.etag;
    guard.status = LoaderStatus::Ok;
    LoaderStatus::Ok
}

/// Shared machinery for the HTTP-backed flavors: state, init dedup, and a
/// cancellable background refresh loop.
struct HttpBackedLoader {
    state: Arc<RwLock<LoaderSnapshot>>,
    init: OnceCell<LoaderStatus>,
    handler: AsyncMutex<Option<Arc<ResilientHttpHandler<HashMap<String, KeyInfo>>>>>,
    refresh_interval: Duration,
    counter: Arc<SecurityEventCounter>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    refresh_task: AsyncMutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl HttpBackedLoader {
    fn new(refresh_interval: Duration, counter: Arc<SecurityEventCounter>) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            state: Arc::new(RwLock::new(LoaderSnapshot::empty())),
            init: OnceCell::new(),
            handler: AsyncMutex::new(None),
            refresh_interval,
            counter,
            cancel_tx,
            cancel_rx,
            refresh_task: AsyncMutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    async fn status(&self) -> LoaderStatus {
        self.state.read().await.status
    }

    async fn get_key(&self, kid: Option<&str>) -> Option<KeyInfo> {
        let guard = self.state.read().await;
        if guard.status != LoaderStatus::Ok {
            return None;
        }
        let lookup_kid = kid.unwrap_or(parser::NO_KID_SENTINEL);
        guard.keys.get(lookup_kid).cloned()
    }

    async fn spawn_refresh(self: &Arc<Self>) {
        if self.refresh_interval.is_zero() {
            return;
        }
        let this = Arc::clone(self);
        let mut cancel_rx = self.cancel_rx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.refresh_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => return,
                    _ = ticker.tick() => {
                        if this.shutting_down.load(Ordering::SeqCst) {
                            return;
                        }
                        let handler = this.handler.lock().await.clone();
                        if let Some(handler) = handler {
                            {
                                let mut guard = this.state.write().await;
                                if guard.status == LoaderStatus::Ok {
                                    guard.status = LoaderStatus::Loading;
                                }
                            }
                            fetch_and_swap(&this.state, &handler, &this.counter).await;
                        }
                    }
                }
            }
        });
        *self.refresh_task.lock().await = Some(handle);
    }

    fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.cancel_tx.send(true);
    }
}

/// File-backed loader: reads once at construction, never refreshes.
pub struct FileLoader {
    state: RwLock<LoaderSnapshot>,
}

impl FileLoader {
    /// Read and parse the JWKS document at `path` immediately.
    pub fn load(path: impl Into<PathBuf>, config: &JwksLoaderConfig, counter: &SecurityEventCounter) -> Self {
        let path = path.into();
        let snapshot = match std::fs::read(&path) {
            Ok(bytes) => match parser::parse_with_limits(&bytes, config.max_document_bytes, config.max_keys) {
                Ok(parsed) => {
                    if parsed.kid_collisions > 0 {
                        counter.increment(ValidationEventType::JwksKidCollision);
                    }
                    LoaderSnapshot {
                        keys: parsed.keys,
                        etag: None,
                        status: LoaderStatus::Ok,
                    }
                }
                Err(err) => {
                    error!(path = %path.display(), error = %err, "failed to parse JWKS file");
                    LoaderSnapshot {
                        status: LoaderStatus::Error,
                        ..LoaderSnapshot::empty()
                    }
                }
            },
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to read JWKS file");
                LoaderSnapshot {
                    status: LoaderStatus::Error,
                    ..LoaderSnapshot::empty()
                }
            }
        };

        Self {
            state: RwLock::new(snapshot),
        }
    }

    pub async fn status(&self) -> LoaderStatus {
        self.state.read().await.status
    }

    pub async fn get_key(&self, kid: Option<&str>) -> Option<KeyInfo> {
        let guard = self.state.read().await;
        if guard.status != LoaderStatus::Ok {
            return None;
        }
        guard.keys.get(kid.unwrap_or(parser::NO_KID_SENTINEL)).cloned()
    }
}

/// Inline-string-backed loader: parses the caller-supplied JSON once.
pub struct InlineLoader {
    state: RwLock<LoaderSnapshot>,
}

impl InlineLoader {
    /// Parse `json` immediately.
    pub fn load(json: &str, config: &JwksLoaderConfig, counter: &SecurityEventCounter) -> Self {
        let snapshot = match parser::parse_with_limits(json.as_bytes(), config.max_document_bytes, config.max_keys)
        {
            Ok(parsed) => {
                if parsed.kid_collisions > 0 {
                    counter.increment(ValidationEventType::JwksKidCollision);
                }
                LoaderSnapshot {
                    keys: parsed.keys,
                    etag: None,
                    status: LoaderStatus::Ok,
                }
            }
            Err(err) => {
                error!(error = %err, "failed to parse inline JWKS");
                LoaderSnapshot {
                    status: LoaderStatus::Error,
                    ..LoaderSnapshot::empty()
                }
            }
        };

        Self {
            state: RwLock::new(snapshot),
        }
    }

    pub async fn status(&self) -> LoaderStatus {
        self.state.read().await.status
    }

    pub async fn get_key(&self, kid: Option<&str>) -> Option<KeyInfo> {
        let guard = self.state.read().await;
        if guard.status != LoaderStatus::Ok {
            return None;
        }
        guard.keys.get(kid.unwrap_or(parser::NO_KID_SENTINEL)).cloned()
    }
}

/// Plain HTTP-backed loader: fetches a JWKS URL directly.
pub struct HttpLoader {
    url: String,
    config: JwksLoaderConfig,
    inner: Arc<HttpBackedLoader>,
}

impl HttpLoader {
    /// Construct, but do not fetch yet; call [`HttpLoader::init_async`].
    pub fn new(url: impl Into<String>, config: JwksLoaderConfig, counter: Arc<SecurityEventCounter>) -> Self {
        Self {
            url: url.into(),
            inner: Arc::new(HttpBackedLoader::new(config.refresh_interval, counter)),
            config,
        }
    }

    /// Idempotent under concurrent calls: only the first triggers a fetch.
    pub async fn init_async(&self) -> LoaderStatus {
        let inner = Arc::clone(&self.inner);
        let url = self.url.clone();
        let config = self.config.clone();

        *inner.init.get_or_init(|| async move {
            {
                let mut guard = inner.state.write().await;
                guard.status = LoaderStatus::Loading;
            }

            let converter = JwksConverter {
                max_document_bytes: config.max_document_bytes,
                max_keys: config.max_keys,
                counter: Arc::clone(&inner.counter),
            };
            let handler = match ResilientHttpHandler::new(url, config.http.clone(), converter) {
                Ok(handler) => Arc::new(handler),
                Err(err) => {
                    error!(error = %err, "failed to build JWKS http handler");
                    let mut guard = inner.state.write().await;
                    guard.status = LoaderStatus::Error;
                    return LoaderStatus::Error;
                }
            };
            *inner.handler.lock().await = Some(Arc::clone(&handler));

            let status = fetch_and_swap(&inner.state, &handler, &inner.counter).await;
            inner.spawn_refresh().await;
            status
        })
        .await
    }

    pub async fn status(&self) -> LoaderStatus {
        self.inner.status().await
    }

    pub async fn get_key(&self, kid: Option<&str>) -> Option<KeyInfo> {
        self.inner.get_key(kid).await
    }

    /// Cancel background refresh; a no-op if never started.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

/// Well-known (OIDC discovery) backed loader: resolves the JWKS URL via C7
/// before behaving like [`HttpLoader`].
pub struct WellKnownHttpLoader {
    discovery_url: String,
    config: JwksLoaderConfig,
    inner: Arc<HttpBackedLoader>,
}

impl WellKnownHttpLoader {
    pub fn new(discovery_url: impl Into<String>, config: JwksLoaderConfig, counter: Arc<SecurityEventCounter>) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            inner: Arc::new(HttpBackedLoader::new(config.refresh_interval, counter)),
            config,
        }
    }

    pub async fn init_async(&self) -> LoaderStatus {
        let inner = Arc::clone(&self.inner);
        let discovery_url = self.discovery_url.clone();
        let config = self.config.clone();

        *inner.init.get_or_init(|| async move {
            {
                let mut guard = inner.state.write().await;
                guard.status = LoaderStatus::Loading;
            }

            let resolved = match well_known::resolve(&discovery_url).await {
                Ok(resolved) => resolved,
                Err(err) => {
                    error!(error = %err, "well-known discovery failed");
                    let event = if matches!(err, well_known::WellKnownError::IssuerMismatch { .. }) {
                        ValidationEventType::ConfigurationWellKnownIssuerMismatch
                    } else {
                        ValidationEventType::JwksLoadFailed
                    };
                    inner.counter.increment(event);
                    let mut guard = inner.state.write().await;
                    guard.status = LoaderStatus::Error;
                    return LoaderStatus::Error;
                }
            };

            let converter = JwksConverter {
                max_document_bytes: config.max_document_bytes,
                max_keys: config.max_keys,
                counter: Arc::clone(&inner.counter),
            };
            let handler = match ResilientHttpHandler::new(resolved.jwks_uri, config.http.clone(), converter) {
                Ok(handler) => Arc::new(handler),
                Err(err) => {
                    error!(error = %err, "failed to build JWKS http handler");
                    let mut guard = inner.state.write().await;
                    guard.status = LoaderStatus::Error;
                    return LoaderStatus::Error;
                }
            };
            *inner.handler.lock().await = Some(Arc::clone(&handler));

            let status = fetch_and_swap(&inner.state, &handler, &inner.counter).await;
            inner.spawn_refresh().await;
            status
        })
        .await
    }

    pub async fn status(&self) -> LoaderStatus {
        self.inner.status().await
    }

    pub async fn get_key(&self, kid: Option<&str>) -> Option<KeyInfo> {
        self.inner.get_key(kid).await
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

/// The closed set of JWKS loader flavors, unified behind one interface.
pub enum JwksLoader {
    File(FileLoader),
    Inline(InlineLoader),
    Http(HttpLoader),
    WellKnownHttp(WellKnownHttpLoader),
}

impl JwksLoader {
    /// Trigger asynchronous initialization. A no-op (returns current status
    /// immediately) for the file and inline flavors, which load synchronously
    /// at construction.
    pub async fn init_async(&self) -> LoaderStatus {
        match self {
            Self::File(loader) => loader.status().await,
            Self::Inline(loader) => loader.status().await,
            Self::Http(loader) => loader.init_async().await,
            Self::WellKnownHttp(loader) => loader.init_async().await,
        }
    }

    pub async fn get_current_status(&self) -> LoaderStatus {
        match self {
            Self::File(loader) => loader.status().await,
            Self::Inline(loader) => loader.status().await,
            Self::Http(loader) => loader.status().await,
            Self::WellKnownHttp(loader) => loader.status().await,
        }
    }

    /// Look up a key by `kid`. Returns `None` unless the loader is `Ok`.
    pub async fn get_key(&self, kid: Option<&str>) -> Option<KeyInfo> {
        match self {
            Self::File(loader) => loader.get_key(kid).await,
            Self::Inline(loader) => loader.get_key(kid).await,
            Self::Http(loader) => loader.get_key(kid).await,
            Self::WellKnownHttp(loader) => loader.get_key(kid).await,
        }
    }

    /// Cancel background refresh, if any. A no-op for file/inline loaders.
    pub fn shutdown(&self) {
        match self {
            Self::File(_) | Self::Inline(_) => {}
            Self::Http(loader) => loader.shutdown(),
            Self::WellKnownHttp(loader) => loader.shutdown(),
        }
    }
}
