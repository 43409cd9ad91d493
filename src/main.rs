use anyhow::{Context, Result};
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod models;
mod parser;
mod services;

use config::{AppConfig, CacheBackend};
use services::cache::{MemoryMetadataCache, MetadataCache};
use services::catalog::{Catalog, CatalogSettings};
use services::metadata::MetadataResolver;
use services::webshare::WebshareClient;

/// Tracks all background task handles for graceful shutdown
struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    async fn shutdown(self) {
        tracing::info!("Initiating graceful shutdown...");

        // Signal all tasks to stop
        self.shutdown.cancel();

        // Wait for all tasks with a timeout
        for (name, handle) in self.handles {
            tracing::debug!("Waiting for {} to finish...", name);
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(())) => tracing::debug!("{} finished cleanly", name),
                Ok(Err(e)) => tracing::warn!("{} panicked: {}", name, e),
                Err(_) => tracing::warn!("{} timed out during shutdown", name),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

pub struct AppState {
    pub catalog: Catalog,
}

async fn connect_cache_db(database_url: &str) -> Result<sqlx::SqlitePool> {
    tracing::debug!("Database URL: {}", database_url);

    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        // Enable WAL mode for better concurrent performance
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // NORMAL sync is safe with WAL and much faster
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        // Busy timeout for concurrent access (5 seconds)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                use sqlx::Executor;
                // Cache size: -8000 = 8MB (negative = KB)
                conn.execute("PRAGMA cache_size = -8000").await?;
                conn.execute("PRAGMA temp_store = MEMORY").await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await
        .context("Failed to open metadata cache database")?;

    db::migrate(&pool).await?;
    let entries = db::cache_entry_count(&pool).await?;
    tracing::info!("SQLite metadata cache ready (WAL mode, {} entries)", entries);

    Ok(pool)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tvstream_catalog=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config.paths.ensure_dirs().await?;

    config.log_config();

    // Initialize background task manager with graceful shutdown support
    let mut bg_tasks = BackgroundTasks::new();
    let shutdown_token = bg_tasks.token();

    let cache: Arc<dyn MetadataCache> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryMetadataCache::new(config.cache.max_entries)),
        CacheBackend::Sqlite => {
            let pool = connect_cache_db(&config.database_url()).await?;

            // Spawn expired-row pruning with cancellation support
            if config.cache.prune_interval_minutes > 0 {
                let prune_pool = pool.clone();
                let cancel = shutdown_token.clone();
                let interval = Duration::from_secs(config.cache.prune_interval_minutes * 60);
                bg_tasks.spawn("cache-prune", async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                tracing::debug!("Cache prune task received shutdown signal");
                                break;
                            }
                            _ = tokio::time::sleep(interval) => {
                                match db::prune_expired(&prune_pool).await {
                                    Ok(removed) if removed > 0 => {
                                        tracing::info!("Pruned {} expired metadata cache rows", removed);
                                    }
                                    Ok(_) => {}
                                    Err(e) => tracing::error!("Metadata cache prune failed: {}", e),
                                }
                            }
                        }
                    }
                });
            } else {
                tracing::info!("Metadata cache pruning disabled (interval set to 0)");
            }

            Arc::new(db::SqliteMetadataCache::new(pool))
        }
    };

    let resolver = MetadataResolver::new(
        services::build_providers(&config.metadata)?,
        cache,
        config.cache.ttl(),
    );
    let resolver = if resolver.has_providers() {
        tracing::info!(
            "Metadata enrichment via {}",
            resolver.provider_names().join(", ")
        );
        Some(Arc::new(resolver))
    } else {
        tracing::warn!("No metadata providers available, items will not be enriched");
        None
    };

    let source = WebshareClient::new(&config.webshare)?;
    let catalog = Catalog::new(
        Arc::new(source),
        resolver,
        CatalogSettings::from(&config.catalog),
    );

    let state = Arc::new(AppState { catalog });

    // Build router
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address))?;
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // After server stops, gracefully shutdown background tasks
    bg_tasks.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
