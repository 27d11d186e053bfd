use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use directories::ProjectDirs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clock::RequestClock,
    handlers::{create_paste, fetch_paste, health, view_paste},
    store::Store,
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Base for URLs returned on create ($PASTELITE_PUBLIC_URL). Defaults to the Host header.
    pub public_url: Option<String>,
    pub cors_origins: Option<String>,
    pub sweep_interval: Duration,
    /// Honour the `x-test-now-ms` header ($PASTELITE_TEST_MODE). Never enable in production.
    pub test_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("PASTELITE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PASTELITE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            data_dir: std::env::var("PASTELITE_DATA_DIR").ok().map(PathBuf::from),
            public_url: std::env::var("PASTELITE_PUBLIC_URL").ok(),
            cors_origins: std::env::var("PASTELITE_CORS_ORIGINS").ok(),
            sweep_interval: Duration::from_secs(
                std::env::var("PASTELITE_SWEEP_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(300),
            ),
            test_mode: std::env::var("PASTELITE_TEST_MODE")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
        }
    }
}

/// Resolve (and create) the data directory: the configured one
/// ($PASTELITE_DATA_DIR), else the platform data dir.
/// Public so the CLI prune command can open the same store.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => {
            let path = platform_data_dir()?;
            std::fs::create_dir_all(&path).context("create platform data dir")?;
            Ok(path)
        }
    }
}

/// Platform-specific app data dir (`~/.local/share/pastelite/`, etc.).
fn platform_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "pastelite")
        .context("could not determine platform data directory")?;
    Ok(dirs.data_dir().to_owned())
}

/// Path of the redb file inside `data_dir`.
pub fn db_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("pastelite.db")
}

/// All HTTP routes, without binding a listener.
pub fn build_router(state: AppState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/api/healthz", get(health))
        .route("/api/pastes", post(create_paste))
        .route("/api/pastes/{id}", get(fetch_paste))
        .route("/p/{id}", get(view_paste))
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let store = Store::open(&db_path(&data_dir)).context("open store")?;
    store.clone().spawn_sweep(cfg.sweep_interval);

    if cfg.test_mode {
        warn!("test mode enabled: requests may override the clock with x-test-now-ms");
    }

    let state = AppState::new(store, RequestClock::new(cfg.test_mode), cfg.public_url);
    let app = build_router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "pastelite server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
