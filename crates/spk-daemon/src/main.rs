//! spk-daemon entry point.
//!
//! Thin: sets up tracing, loads config, picks the storage backend, seeds
//! configured spaces, wires middleware and starts the HTTP server. Route
//! handlers live in `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use spk_audit::AuditWriter;
use spk_config::{
    load_layered_yaml, report_unused_keys, ConfigConsumer, LoadedConfig, ServiceConfig,
    UnusedKeyPolicy,
};
use spk_daemon::{routes, state};
use spk_db::{MemStore, PgStore};
use spk_registry::{Clock, SpaceRegistry, SystemClock};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config_from_env()?;
    let report = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys the daemon does not read");
    }
    let cfg = ServiceConfig::from_config_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let registry = build_registry(&cfg).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    registry
        .seed(&cfg.seed_node_ids, clock.now())
        .await
        .context("seeding configured spaces failed")?;

    let shared = Arc::new(state::AppState::new(registry, clock));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_expiry_sweep(Arc::clone(&shared), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(a) => a,
        None => cfg
            .daemon_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("daemon.addr '{}' is not a socket address", cfg.daemon_addr))?,
    };
    info!("spk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `SPK_CONFIG` = comma-separated YAML paths, merged left to right.
fn load_config_from_env() -> anyhow::Result<LoadedConfig> {
    let raw = std::env::var("SPK_CONFIG").unwrap_or_default();
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        return LoadedConfig::empty();
    }
    load_layered_yaml(&paths)
}

/// Postgres when the configured env var holds a URL, in-memory otherwise.
async fn build_registry(cfg: &ServiceConfig) -> anyhow::Result<SpaceRegistry> {
    let mut registry = match cfg.database_url() {
        Some(url) => {
            let pool = spk_db::connect(&url).await?;
            spk_db::migrate(&pool).await?;
            info!("storage: postgres");
            let pg = Arc::new(PgStore::new(pool));
            SpaceRegistry::new(pg.clone(), pg.clone(), pg, cfg.engine.clone())
        }
        None => {
            warn!(
                env = %cfg.database_url_env,
                "no database url configured; using in-memory storage (not durable)"
            );
            SpaceRegistry::in_memory(Arc::new(MemStore::new()), cfg.engine.clone())
        }
    };

    registry = registry
        .with_max_write_attempts(cfg.max_write_attempts)
        .with_analytics_tz(cfg.analytics_tz);

    if let Some(path) = &cfg.audit_path {
        let writer = AuditWriter::resume(path, cfg.audit_hash_chain)
            .with_context(|| format!("open audit log {path}"))?;
        info!(path = %path, seq = writer.seq(), "audit log opened");
        registry = registry.with_audit(writer);
    }

    Ok(registry)
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("SPK_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
