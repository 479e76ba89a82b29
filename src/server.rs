//! Process-wide service state and the HTTP listener.
//!
//! All long-lived handles (database session, stores, token service) are built
//! once in [`AppState::init`] before the listener starts and are handed to
//! handlers through axum state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::api;
use crate::auth::{AuthGate, TokenService, UserStore};
use crate::catalog::BookCatalog;
use crate::config::AppConfig;
use crate::db::{DatabaseConfig, Db, create_connection, ensure_schema};
use crate::images::{ImageStore, LocalImageStore};

/// Shared handles injected into every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Db,
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenService>,
    pub gate: Arc<AuthGate>,
    pub catalog: Arc<BookCatalog>,
}

impl AppState {
    /// Connect to the database, bootstrap the schema, open the image
    /// directory and wire the services together.
    pub async fn init(config: AppConfig, db_config: DatabaseConfig) -> Result<Self> {
        config.validate()?;

        info!("Using database url: {}", db_config.url);
        let db = create_connection(db_config)
            .await
            .context("connecting to database")?;
        ensure_schema(&db).await.context("bootstrapping schema")?;

        let images = LocalImageStore::open(&config.images_dir)
            .await?
            .with_max_width(config.image_max_width);
        info!("Serving cover images from {}", images.root().display());
        let images: Arc<dyn ImageStore> = Arc::new(images);

        let tokens = Arc::new(TokenService::new(&config.jwt_secret, config.token_ttl()));

        Ok(Self {
            users: Arc::new(UserStore::new(db.clone())),
            gate: Arc::new(AuthGate::new(tokens.clone())),
            catalog: Arc::new(BookCatalog::new(db.clone(), images)),
            tokens,
            db,
            config: Arc::new(config),
        })
    }

    /// Tear down after the listener has drained.
    ///
    /// The SurrealDB client has no explicit close. Teardown is dropping this
    /// handle; the embedded engine closes once the router's clones are gone
    /// too, which `serve` guarantees by the time it calls this.
    pub async fn shutdown(self) -> Result<()> {
        info!(
            handles = Arc::strong_count(&self.catalog),
            "Shutting down, dropping service handles"
        );
        drop(self);
        Ok(())
    }
}

/// Serve the HTTP API until SIGINT/SIGTERM, then tear down the state.
pub async fn serve(state: AppState) -> Result<()> {
    let bind = state.config.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("Catalog API listening on http://{}", listener.local_addr()?);

    let app = api::router(state.clone());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.shutdown().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
