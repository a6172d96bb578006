//! ReviewA2Z HTTP server
//!
//! Configuration is read from `REVIEWA2Z_CONFIG` (default `config.toml`) and
//! the environment. Setting `REVIEWA2Z_SEED` to a JSON file of
//! `{"table": [rows...]}` runs against an in-process database seeded from it
//! instead of the hosted one.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use reviewa2z::{
    api::{self, AppState},
    backend::{MemoryBackend, RestBackend, SharedBackend},
    config,
    error::{AppError, Result},
    models::LoggingConfig,
};

const CONFIG_VAR: &str = "REVIEWA2Z_CONFIG";
const SEED_VAR: &str = "REVIEWA2Z_SEED";

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn memory_backend(seed_path: &Path) -> Result<SharedBackend> {
    let content = tokio::fs::read_to_string(seed_path).await?;
    let Value::Object(tables) = serde_json::from_str(&content)? else {
        return Err(AppError::config("seed file must be a JSON object of tables"));
    };

    let backend = MemoryBackend::new();
    for (table, rows) in tables {
        let Value::Array(rows) = rows else {
            return Err(AppError::config(format!("seed table {table} must be an array")));
        };
        info!(table = %table, rows = rows.len(), "seeding in-memory table");
        backend.seed(&table, rows).await?;
    }
    Ok(Arc::new(backend))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::var(CONFIG_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let config = Arc::new(config::load(&config_path)?);
    init_tracing(&config.logging);

    info!("ReviewA2Z server starting...");

    let backend = match env::var(SEED_VAR).ok().map(PathBuf::from) {
        Some(path) => {
            info!(path = %path.display(), "using in-memory database");
            memory_backend(&path).await?
        }
        None => {
            info!(url = %config.backend.url, "using hosted database");
            Arc::new(RestBackend::new(&config.backend)?) as SharedBackend
        }
    };

    let state = AppState::new(Arc::clone(&config), backend);

    // Drop cache entries nobody reads any more
    let cache = Arc::clone(&state.services.context.cache);
    let gc_every = config.cache.gc_time();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(gc_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let dropped = cache.gc().await;
            if dropped > 0 {
                tracing::debug!(dropped, "cache gc");
            }
        }
    });

    let address = config.server.address();
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    api::serve(listener, state).await
}
