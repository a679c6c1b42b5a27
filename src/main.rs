//! Setlist Back binary entrypoint wiring REST, SSE, the document store and the scoring trigger.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use setlist_back::{
    config::{AppConfig, StoreKind},
    dao::document_store::memory::MemoryStore,
    routes,
    services::{catalog::MusicCatalog, scoring_trigger},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let catalog = build_catalog(&config)?;
    let store_kind = config.store;
    let app_state = AppState::new(config, catalog);

    install_store(&app_state, store_kind).await?;
    scoring_trigger::spawn(app_state.clone());

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the configured store; MongoDB is connected by the storage supervisor
/// in the background while the service starts in degraded mode.
async fn install_store(state: &SharedState, kind: StoreKind) -> anyhow::Result<()> {
    match kind {
        StoreKind::Memory => {
            info!("using the in-memory document store");
            state.set_store(Arc::new(MemoryStore::new())).await;
            Ok(())
        }
        #[cfg(feature = "mongo-store")]
        StoreKind::Mongo => {
            use setlist_back::{
                dao::document_store::{
                    DocumentStore,
                    mongodb::{MongoConfig, MongoDocumentStore},
                },
                services::storage_supervisor,
            };

            let mongo_config = MongoConfig::from_env()
                .await
                .context("reading MongoDB configuration")?;
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let mongo_config = mongo_config.clone();
                async move {
                    let store = MongoDocumentStore::connect(mongo_config).await?;
                    Ok(Arc::new(store) as Arc<dyn DocumentStore>)
                }
            }));
            Ok(())
        }
        #[cfg(not(feature = "mongo-store"))]
        StoreKind::Mongo => anyhow::bail!("built without the `mongo-store` feature"),
    }
}

fn build_catalog(config: &AppConfig) -> anyhow::Result<Arc<dyn MusicCatalog>> {
    #[cfg(feature = "deezer-catalog")]
    {
        let catalog = setlist_back::services::catalog::DeezerCatalog::new(&config.catalog_base_url)
            .context("building the music catalog client")?;
        info!(base_url = %config.catalog_base_url, "using the Deezer catalog");
        Ok(Arc::new(catalog))
    }

    #[cfg(not(feature = "deezer-catalog"))]
    {
        info!(
            base_url = %config.catalog_base_url,
            "built without an HTTP catalog; track search returns no results"
        );
        Ok(Arc::new(setlist_back::services::catalog::StaticCatalog::new(Vec::new())))
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
