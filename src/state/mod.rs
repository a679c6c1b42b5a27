/// Round and game status model with its transition table.
pub mod phase;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{document_store::DocumentStore, repository::GameRepository},
    error::ServiceError,
    services::catalog::MusicCatalog,
};

pub type SharedState = Arc<AppState>;

/// Central application state holding the storage handle and shared services.
pub struct AppState {
    store: RwLock<Option<Arc<dyn DocumentStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    catalog: Arc<dyn MusicCatalog>,
    /// Rounds currently being scored, keyed by `(game_id, round_number)`.
    scoring_in_flight: DashMap<(String, u32), ()>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, catalog: Arc<dyn MusicCatalog>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            catalog,
            scoring_in_flight: DashMap::new(),
        })
    }

    /// Obtain a handle to the current document store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn DocumentStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Repository over the installed store, or [`ServiceError::Degraded`].
    pub async fn repository(&self) -> Result<GameRepository, ServiceError> {
        self.store()
            .await
            .map(GameRepository::new)
            .ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn DocumentStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn MusicCatalog> {
        &self.catalog
    }

    /// Registry used by the scoring trigger to avoid concurrent runs per round.
    pub fn scoring_in_flight(&self) -> &DashMap<(String, u32), ()> {
        &self.scoring_in_flight
    }
}
