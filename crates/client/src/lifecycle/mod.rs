//! Install/activate lifecycle of one cache generation.
//!
//! ```text
//! Uninstalled -> Installing -> Installed(v) -> Activating -> Active(v)
//!      ^______________| (precache failure)
//! ```
//!
//! Transitions are serialized. Asking for a transition the controller has
//! already made is a no-op, so hosts can re-deliver install and activate
//! events freely.

pub mod clients;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::try_join_all;
use reqwest::Url;

use crate::fetch::Transport;
use crate::request::Request;
use offgrid_core::{AppConfig, CacheDb, CacheEntry, CacheStore, Error};

pub use clients::Clients;

/// Lifecycle state of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    Installed { version: String },
    Activating { version: String },
    Active { version: String },
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninstalled => write!(f, "uninstalled"),
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Installed { version } => write!(f, "installed({version})"),
            LifecycleState::Activating { version } => write!(f, "activating({version})"),
            LifecycleState::Active { version } => write!(f, "active({version})"),
        }
    }
}

/// Outcome of an install transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub version: String,
    pub store: String,
    /// Resources written to the store; 0 when nothing changed.
    pub precached: usize,
    /// False when the controller was already installed.
    pub changed: bool,
}

/// Outcome of an activate transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub version: String,
    /// Stores deleted because they belong to another generation.
    pub evicted: Vec<String>,
    /// Clients that switched to this generation.
    pub claimed: usize,
    /// False when the controller was already active.
    pub changed: bool,
}

/// Fixed inputs of one cache generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub version: String,
    pub store_name: String,
    pub origin: Url,
    pub precache: Vec<String>,
}

impl Generation {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin {}: {e}", config.origin)))?;
        Ok(Self {
            version: config.cache_version.clone(),
            store_name: config.store_name(),
            origin,
            precache: config.precache.clone(),
        })
    }
}

struct Inner {
    state: LifecycleState,
    store: Option<CacheStore>,
}

/// Drives install and activation of the current generation.
pub struct Lifecycle {
    db: CacheDb,
    transport: Arc<dyn Transport>,
    generation: Generation,
    inner: Mutex<Inner>,
    transition: tokio::sync::Mutex<()>,
    skip_waiting: AtomicBool,
    clients: Clients,
}

impl Lifecycle {
    pub fn new(db: CacheDb, transport: Arc<dyn Transport>, generation: Generation) -> Self {
        Self {
            db,
            transport,
            generation,
            inner: Mutex::new(Inner { state: LifecycleState::Uninstalled, store: None }),
            transition: tokio::sync::Mutex::new(()),
            skip_waiting: AtomicBool::new(false),
            clients: Clients::new(),
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().state.clone()
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Whether the installed generation asked to activate without waiting.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// The current store, once this generation is active.
    pub fn active_store(&self) -> Option<CacheStore> {
        let inner = self.lock();
        match inner.state {
            LifecycleState::Active { .. } => inner.store.clone(),
            _ => None,
        }
    }

    /// Register a client. It is controlled right away if a generation is active.
    pub fn open_client(&self, id: &str) {
        let controller = match self.state() {
            LifecycleState::Active { version } => Some(version),
            _ => None,
        };
        self.clients.open(id, controller);
    }

    /// Unregister a client. Returns false if it was not open.
    pub fn close_client(&self, id: &str) -> bool {
        let closed = self.clients.close(id);
        tracing::debug!(client = id, closed, remaining = self.clients.len(), "client closed");
        closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        tracing::info!(%state, "lifecycle transition");
        self.lock().state = state;
    }

    /// Create the current store and precache every resource as one batch.
    ///
    /// If any resource fails to fetch or answers with a non-ok status nothing is
    /// written and the controller returns to `Uninstalled`.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let _transition = self.transition.lock().await;

        match self.state() {
            LifecycleState::Uninstalled => {}
            LifecycleState::Installed { .. } | LifecycleState::Active { .. } => {
                return Ok(InstallReport {
                    version: self.generation.version.clone(),
                    store: self.generation.store_name.clone(),
                    precached: 0,
                    changed: false,
                });
            }
            state => return Err(Error::InvalidTransition { action: "install", state: state.to_string() }),
        }

        self.set_state(LifecycleState::Installing);

        match self.precache().await {
            Ok((store, precached)) => {
                self.lock().store = Some(store);
                self.set_state(LifecycleState::Installed { version: self.generation.version.clone() });
                self.skip_waiting.store(true, Ordering::SeqCst);
                tracing::info!(version = %self.generation.version, precached, "installed, skipping waiting");
                Ok(InstallReport {
                    version: self.generation.version.clone(),
                    store: self.generation.store_name.clone(),
                    precached,
                    changed: true,
                })
            }
            Err(e) => {
                tracing::warn!(version = %self.generation.version, error = %e, "install failed");
                self.set_state(LifecycleState::Uninstalled);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<(CacheStore, usize), Error> {
        let store = self.db.open_store(&self.generation.store_name).await?;
        let entries = try_join_all(self.generation.precache.iter().map(|path| self.fetch_precache(path))).await?;
        let written = store.put_all(entries).await?;
        Ok((store, written))
    }

    async fn fetch_precache(&self, path: &str) -> Result<CacheEntry, Error> {
        let url = self
            .generation
            .origin
            .join(path)
            .map_err(|e| Error::PrecacheFailed { url: path.to_string(), reason: e.to_string() })?;
        let request = Request::get(url);

        let response = self.transport.fetch(&request).await.map_err(|e| Error::PrecacheFailed {
            url: request.url.to_string(),
            reason: e.to_string(),
        })?;
        if !response.ok() {
            return Err(Error::PrecacheFailed {
                url: request.url.to_string(),
                reason: format!("status {}", response.status.as_u16()),
            });
        }

        Ok(response.into_entry(&request))
    }

    /// Delete every store of another generation, then claim all open clients.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let _transition = self.transition.lock().await;
        let version = self.generation.version.clone();

        match self.state() {
            LifecycleState::Installed { .. } => {}
            LifecycleState::Active { .. } => {
                return Ok(ActivateReport { version, evicted: Vec::new(), claimed: 0, changed: false });
            }
            state => return Err(Error::InvalidTransition { action: "activate", state: state.to_string() }),
        }

        self.set_state(LifecycleState::Activating { version: version.clone() });

        let evicted = match self.evict_stale().await {
            Ok(evicted) => evicted,
            Err(e) => {
                tracing::warn!(%version, error = %e, "activation failed");
                self.set_state(LifecycleState::Installed { version });
                return Err(e);
            }
        };

        self.set_state(LifecycleState::Active { version: version.clone() });
        let claimed = self.clients.claim(&version);
        tracing::info!(%version, evicted = evicted.len(), claimed, "activated");

        Ok(ActivateReport { version, evicted, claimed, changed: true })
    }

    async fn evict_stale(&self) -> Result<Vec<String>, Error> {
        let mut evicted = Vec::new();
        for name in self.db.store_names().await? {
            if name != self.generation.store_name && self.db.delete_store(&name).await? {
                tracing::info!(store = %name, "evicted stale cache store");
                evicted.push(name);
            }
        }
        Ok(evicted)
    }
}
