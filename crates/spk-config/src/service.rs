//! Typed view over the merged config JSON.
//!
//! Every pointer read here must also be listed in
//! [`crate::consumed_pointers`]; missing keys fall back to defaults.

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde_json::Value;
use spk_engine::{
    EngineConfig, SessionPolicy, DEFAULT_RESERVATION_DURATION_SECS, MAX_RESERVATION_DURATION_SECS,
};

pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8899";
pub const DEFAULT_DB_URL_ENV: &str = "SPK_DATABASE_URL";
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    /// Bounded optimistic-concurrency retries per registry operation.
    pub max_write_attempts: u32,
    /// Spaces created at startup if absent.
    pub seed_node_ids: Vec<String>,
    /// Timezone for analytics "today" / "week" boundaries.
    pub analytics_tz: Tz,
    /// Audit JSONL path; `None` disables the audit log.
    pub audit_path: Option<String>,
    pub audit_hash_chain: bool,
    pub daemon_addr: String,
    /// Name of the env var holding the database URL (never the URL itself).
    pub database_url_env: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            seed_node_ids: Vec::new(),
            analytics_tz: Tz::UTC,
            audit_path: None,
            audit_hash_chain: true,
            daemon_addr: DEFAULT_DAEMON_ADDR.to_string(),
            database_url_env: DEFAULT_DB_URL_ENV.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Build from canonical config JSON (produced by `load_layered_yaml*`).
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let d = Self::default();

        let duration = match cfg.pointer("/reservation/duration_secs") {
            None | Some(Value::Null) => DEFAULT_RESERVATION_DURATION_SECS,
            Some(v) => v
                .as_i64()
                .context("reservation.duration_secs must be an integer")?,
        };
        if !(1..=MAX_RESERVATION_DURATION_SECS).contains(&duration) {
            bail!(
                "reservation.duration_secs must be in 1..={MAX_RESERVATION_DURATION_SECS} (got {duration})"
            );
        }

        let session_policy = match opt_str(cfg, "/sessions/policy")? {
            None => d.engine.session_policy,
            Some("all_occupancy") => SessionPolicy::AllOccupancy,
            Some("unreserved_only") => SessionPolicy::UnreservedOnly,
            Some(other) => {
                return Err(anyhow!(
                    "sessions.policy must be 'all_occupancy' or 'unreserved_only' (got '{other}')"
                ))
            }
        };

        let max_write_attempts = match cfg.pointer("/registry/max_write_attempts") {
            None | Some(Value::Null) => d.max_write_attempts,
            Some(v) => {
                let n = v
                    .as_u64()
                    .context("registry.max_write_attempts must be a positive integer")?;
                u32::try_from(n)
                    .ok()
                    .filter(|n| *n > 0)
                    .context("registry.max_write_attempts must be in 1..=u32::MAX")?
            }
        };

        let seed_node_ids = match cfg.pointer("/seed/node_ids") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .context("seed.node_ids entries must be strings")
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => bail!("seed.node_ids must be a list of strings"),
        };

        let analytics_tz = match opt_str(cfg, "/analytics/timezone")? {
            None => d.analytics_tz,
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow!("analytics.timezone '{name}' is not a valid IANA zone: {e}"))?,
        };

        let audit_hash_chain = match cfg.pointer("/audit/hash_chain") {
            None | Some(Value::Null) => d.audit_hash_chain,
            Some(v) => v.as_bool().context("audit.hash_chain must be a bool")?,
        };

        Ok(Self {
            engine: EngineConfig::new(duration, session_policy),
            max_write_attempts,
            seed_node_ids,
            analytics_tz,
            audit_path: opt_str(cfg, "/audit/path")?.map(str::to_string),
            audit_hash_chain,
            daemon_addr: opt_str(cfg, "/daemon/addr")?
                .unwrap_or(DEFAULT_DAEMON_ADDR)
                .to_string(),
            database_url_env: opt_str(cfg, "/database/url_env")?
                .unwrap_or(DEFAULT_DB_URL_ENV)
                .to_string(),
        })
    }

    /// Resolve the database URL from the configured env var, if set.
    pub fn database_url(&self) -> Option<String> {
        std::env::var(&self.database_url_env)
            .ok()
            .filter(|s| !s.trim().is_empty())
    }
}

fn opt_str<'a>(cfg: &'a Value, ptr: &str) -> Result<Option<&'a str>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => bail!("config {ptr} must be a string"),
    }
}
