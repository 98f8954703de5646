//! lyra-ca - Corpus Acquisition & Annotation service
//!
//! **Module Identity:**
//! - Name: lyra-ca
//! - Default port: 5731
//!
//! Serves lyric corpora through a memory/SQLite/network cache and runs
//! chunked semantic annotation against a remote classification service.

use anyhow::Result;
use clap::Parser;
use lyra_ca::annotate::HttpClassificationService;
use lyra_ca::cache::{
    BroadcastInvalidationBus, DurableTier, HttpCorpusSource, NetworkLoader, SqliteDurableTier,
    TieredCache, TieredCacheConfig,
};
use lyra_ca::AppState;
use lyra_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use lyra_common::events::EventBus;
use lyra_common::SystemClock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODULE_NAME: &str = "lyra-ca";

/// Event bus capacity; a lagging cache subscriber clears its local tiers
const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "lyra-ca")]
#[command(about = "Lyra corpus acquisition and annotation service", long_about = None)]
#[command(version)]
struct Args {
    /// HTTP server port
    #[arg(short, long, default_value = "5731", env = "LYRA_CA_PORT")]
    port: u16,

    /// Root folder holding the database and durable cache
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Explicit TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level. A configured log file gets a
/// second, ANSI-free layer.
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let file_layer = match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = lyra_common::config::load_module_config(MODULE_NAME, args.config.as_deref())?;
    init_tracing(&config)?;

    info!("Starting lyra-ca (Corpus Acquisition & Annotation)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("LYRA_GIT_HASH"),
        env!("LYRA_BUILD_TIMESTAMP"),
        env!("LYRA_BUILD_PROFILE")
    );

    // Step 1: Resolve root folder
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_override(args.root_folder)
        .with_toml_root(config.root_folder.clone())
        .resolve();

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = lyra_ca::db::init_database_pool(&db_path).await?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

    // Step 4: Corpus cache
    let request_timeout = Duration::from_secs(config.annotation.timeout_secs);
    let source = HttpCorpusSource::new(&config.corpora, request_timeout)?;
    if source.corpus_types().is_empty() {
        warn!("No corpus sources configured; add [corpora.<type>] url entries");
    } else {
        info!("Corpus sources: {}", source.corpus_types().join(", "));
    }

    let durable: Arc<dyn DurableTier> = Arc::new(SqliteDurableTier::new(db_pool.clone()));
    let cache = Arc::new(TieredCache::new(
        TieredCacheConfig::from(&config.cache),
        NetworkLoader::new(Arc::new(source)),
        Some(durable),
        Arc::new(BroadcastInvalidationBus::new(event_bus.clone())),
        Arc::new(SystemClock),
    ));

    match cache.purge_expired().await {
        Ok(purged) => info!("Startup purge removed {} expired durable entries", purged),
        Err(e) => warn!("Startup purge failed: {}", e),
    }

    // Step 5: Annotation service (optional)
    let mut state = AppState::new(db_pool.clone(), Arc::clone(&cache), event_bus);
    match &config.annotation.endpoint {
        Some(endpoint) => {
            let api_key = lyra_ca::config::resolve_annotation_api_key(&db_pool, &config).await?;
            let classifier = HttpClassificationService::new(
                endpoint.clone(),
                api_key,
                config.annotation.requests_per_second,
                request_timeout,
            )?;
            info!("Annotation service: {}", endpoint);
            state = state.with_classifier(Arc::new(classifier), config.pipeline.clone());
        }
        None => warn!("No [annotation] endpoint configured; annotation runs are disabled"),
    }

    let runs = Arc::clone(&state.runs);
    let app = lyra_ca::build_router(state);

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runs.cancel_all();
    cache.shutdown().await;
    info!("lyra-ca stopped");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install terminate handler: {}", e);
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
