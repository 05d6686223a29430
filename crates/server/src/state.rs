//! Shared server state.

use std::sync::Arc;

use offgrid_client::{ClassifierPolicy, FetchConfig, Generation, HttpTransport, Interceptor, Lifecycle, Transport};
use offgrid_core::{AppConfig, CacheDb, Error};

/// Everything the tools need, built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub db: CacheDb,
    pub transport: Arc<dyn Transport>,
    pub lifecycle: Arc<Lifecycle>,
    pub interceptor: Interceptor,
}

impl AppState {
    /// Open the configured database and build the state around it.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        Self::with_db(config, db)
    }

    pub fn with_db(config: AppConfig, db: CacheDb) -> Result<Self, Error> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(FetchConfig::from(&config))?);
        let generation = Generation::from_config(&config)?;
        let lifecycle = Arc::new(Lifecycle::new(db.clone(), transport.clone(), generation));
        let interceptor = Interceptor::new(ClassifierPolicy::from_config(&config)?, transport.clone(), lifecycle.clone())?;

        Ok(Self { config, db, transport, lifecycle, interceptor })
    }

    /// Run the host's install trigger, then activate if the new generation
    /// asked to skip waiting and the configuration honours it.
    ///
    /// Failures are logged; the triggers can be re-run through the tools.
    pub async fn bootstrap(&self) {
        match self.lifecycle.install().await {
            Ok(report) => tracing::info!(version = %report.version, precached = report.precached, "install complete"),
            Err(e) => {
                tracing::error!(error = %e, "install failed, requests will not be intercepted");
                return;
            }
        }

        if !(self.config.skip_waiting && self.lifecycle.skip_waiting_requested()) {
            tracing::info!("waiting for explicit activation");
            return;
        }

        if let Err(e) = self.lifecycle.activate().await {
            tracing::error!(error = %e, "activation failed");
        }
    }
}

/// State pointed at a mock origin, backed by an in-memory database.
#[cfg(test)]
pub(crate) async fn state_for(mock_server: &wiremock::MockServer, skip_waiting: bool) -> AppState {
    let config = AppConfig {
        origin: mock_server.uri(),
        precache: vec!["/".into(), "/index.html".into()],
        skip_waiting,
        ..Default::default()
    };
    AppState::with_db(config, CacheDb::open_in_memory().await.unwrap()).unwrap()
}
