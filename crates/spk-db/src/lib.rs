//! spk-db
//!
//! Storage collaborators for the registry:
//!
//! - [`SpaceStore`]: one record per space, get / conditional put / scan
//! - [`SessionLog`]: append-only completed occupancy intervals
//! - [`HistoryLog`]: append-only raw sensor readings
//!
//! Two backends: [`MemStore`] (in-process, used by tests and when no database
//! is configured) and [`PgStore`] (Postgres via sqlx).

use anyhow::{Context, Result};
use async_trait::async_trait;
use spk_schemas::{EpochSecs, ParkingSpace, SensorReading, SessionRecord};
use sqlx::postgres::PgPoolOptions;

mod mem;
mod pg;

pub use mem::MemStore;
pub use pg::PgStore;
pub use sqlx::PgPool;

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// The stored version did not match the caller's expectation.
    /// `current_version` is `None` when the record vanished or the caller
    /// expected it to be absent but it was not readable.
    Conflict { current_version: Option<u64> },
}

impl PutOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, PutOutcome::Written)
    }
}

/// Durable keyed storage of space records.
#[async_trait]
pub trait SpaceStore: Send + Sync {
    async fn get(&self, node_id: &str) -> Result<Option<ParkingSpace>>;

    /// Upsert conditioned on the previously loaded version.
    ///
    /// - `expected_version = None`: insert only if no record exists.
    /// - `expected_version = Some(v)`: replace only if the stored record's
    ///   version is `v`.
    ///
    /// The caller is responsible for bumping `space.version`.
    async fn put(&self, space: &ParkingSpace, expected_version: Option<u64>) -> Result<PutOutcome>;

    /// All records, ordered by `node_id`.
    async fn scan(&self) -> Result<Vec<ParkingSpace>>;
}

/// Append-only log of completed sessions.
#[async_trait]
pub trait SessionLog: Send + Sync {
    async fn append(&self, session: &SessionRecord) -> Result<()>;

    /// Sessions with `end_time >= since` (all when `None`), oldest first.
    async fn sessions_since(&self, since: Option<EpochSecs>) -> Result<Vec<SessionRecord>>;
}

/// Append-only log of raw readings.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, reading: &SensorReading) -> Result<()>;
}

/// Connect to Postgres.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='parking_spaces'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_spaces_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_spaces_table: bool,
}
