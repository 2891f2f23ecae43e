//! namedeck catalog service (namedeck-swipe) - Main entry point
//!
//! Serves the tiered name catalog, search and the swipe session over HTTP/SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use namedeck_common::config::load_or_default;
use namedeck_common::events::EventBus;
use namedeck_swipe::api::{self, AppContext};
use namedeck_swipe::catalog::{open_source, CatalogOptions, DataSource, TieredCatalog};
use namedeck_swipe::config::{Overrides, ServiceConfig};
use namedeck_swipe::db::{self, SnapshotStore, SqliteSnapshotStore};
use namedeck_swipe::deck::DeckStore;
use namedeck_swipe::search::SearchIndex;
use namedeck_swipe::session::SwipeSession;
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for namedeck-swipe
#[derive(Parser, Debug)]
#[command(name = "namedeck-swipe")]
#[command(about = "Tiered name catalog and swipe session service")]
#[command(version)]
struct Args {
    /// Bootstrap TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for the database and the default local dataset
    #[arg(short, long)]
    root_folder: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "NAMEDECK_PORT")]
    port: Option<u16>,

    /// Dataset location: http(s) base URL or local directory
    #[arg(short, long, env = "NAMEDECK_DATA_SOURCE")]
    data_source: Option<String>,

    /// SQLite database path
    #[arg(long, env = "NAMEDECK_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The TOML file carries the default log level, so it is read before tracing is up
    let toml_config = load_or_default(args.config.as_deref());

    // Initialize tracing
    let default_filter = match &toml_config {
        Ok(config) => format!("namedeck_swipe={},tower_http=info", config.logging.level),
        Err(_) => "namedeck_swipe=debug,tower_http=info".to_string(),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting namedeck-swipe v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml_config = toml_config.context("Failed to load configuration")?;
    let config = ServiceConfig::resolve(
        toml_config,
        Overrides {
            root_folder: args.root_folder,
            port: args.port,
            data_source: args.data_source,
            database_path: args.database,
        },
    );
    info!("Root folder: {}", config.root_folder.display());
    info!("Data source: {}", config.data_source);

    // Database
    let pool = db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    // Catalog stack
    let events = Arc::new(EventBus::new(config.catalog.event_capacity));
    let source: Arc<dyn DataSource> = Arc::from(
        open_source(&config.data_source, config.fetch_timeout()).context("Failed to open data source")?,
    );
    let catalog = Arc::new(TieredCatalog::new(
        Arc::clone(&source),
        CatalogOptions::from(&config.catalog),
        Arc::clone(&events),
    ));
    let search = Arc::new(SearchIndex::new(Arc::clone(&catalog), Arc::clone(&events)));
    let decks = Arc::new(DeckStore::new(source));

    tokio::spawn(warm_up(Arc::clone(&catalog), Arc::clone(&search), pool.clone()));

    // Swipe session
    let snapshots = Arc::new(SqliteSnapshotStore::new(pool.clone()));
    let session = Arc::new(
        SwipeSession::open(
            Arc::clone(&catalog),
            Arc::clone(&decks),
            snapshots.clone(),
            config.swipe.clone(),
            Arc::clone(&events),
        )
        .await
        .context("Failed to open swipe session")?,
    );
    if session.is_resumable() {
        match session.resume().await {
            Ok(stats) => info!(
                deck_type = %stats.deck_type,
                position = stats.position,
                remaining = stats.remaining,
                "Resumed swipe session"
            ),
            Err(e) => warn!("Persisted swipe session could not be resumed: {}", e),
        }
    }

    let app = api::create_router(AppContext {
        catalog,
        search,
        decks,
        session,
        events,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Err(e) = snapshots.flush().await {
        warn!("Pending session snapshots not written: {}", e);
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Load the catalog manifest, core chunk and search index in the background
async fn warm_up(catalog: Arc<TieredCatalog>, search: Arc<SearchIndex>, pool: SqlitePool) {
    match catalog.warm_up().await {
        Ok(core) => info!(entries = core.metadata.count, "Core chunk ready"),
        Err(e) => error!("Core chunk unavailable, serving the bootstrap seed: {}", e),
    }

    if !search.load().await {
        warn!("Search running in degraded mode");
    }

    if let Some(manifest) = catalog.manifest() {
        match db::settings::record_dataset_version(&pool, &manifest.version).await {
            Ok(Some(previous)) => info!(
                previous = %previous,
                current = %manifest.version,
                "Dataset version changed"
            ),
            Ok(None) => {}
            Err(e) => warn!("Failed to record dataset version: {}", e),
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
