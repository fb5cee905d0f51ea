//! Command handler modules for spk-cli.
//!
//! Shared utilities used by multiple command paths live here.

pub mod sessions;

use anyhow::{Context, Result};
use spk_config::{
    load_layered_yaml, report_unused_keys, ConfigConsumer, LoadedConfig, ServiceConfig,
    UnusedKeyPolicy,
};
use spk_db::PgPool;
use tracing::warn;

/// Load the layered config named by `--config` (defaults when empty).
pub fn load_service_config(paths: &[String]) -> Result<(LoadedConfig, ServiceConfig)> {
    let loaded = if paths.is_empty() {
        LoadedConfig::empty()?
    } else {
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        load_layered_yaml(&refs)?
    };

    let report = report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config keys not read by the cli");
    }

    let cfg = ServiceConfig::from_config_json(&loaded.config_json)?;
    Ok((loaded, cfg))
}

/// Connect using the URL held in the configured env var.
pub async fn connect_db(cfg: &ServiceConfig) -> Result<PgPool> {
    let url = cfg
        .database_url()
        .with_context(|| format!("{} is not set", cfg.database_url_env))?;
    spk_db::connect(&url).await
}
