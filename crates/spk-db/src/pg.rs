use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use spk_schemas::{
    AdminMode, EpochSecs, ParkingSpace, SensorReading, SensorStatus, SessionRecord,
};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{HistoryLog, PutOutcome, SessionLog, SpaceStore};

const SPACE_COLUMNS: &str = r#"
    node_id,
    sensor_status,
    distance_cm,
    reserved,
    reservation_start,
    reservation_expiry,
    qr_token,
    checked_in,
    checkin_time,
    admin_mode,
    active_session_start,
    last_update,
    version
"#;

/// Postgres backend. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_version(&self, node_id: &str) -> Result<Option<u64>> {
        let row = sqlx::query("select version from parking_spaces where node_id = $1")
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch space version failed")?;

        row.map(|r| version_from_db(r.try_get("version")?))
            .transpose()
    }
}

fn version_from_db(v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| anyhow!("negative version in parking_spaces: {v}"))
}

fn version_to_db(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("version overflows bigint: {v}"))
}

fn space_from_row(row: &PgRow) -> Result<ParkingSpace> {
    let sensor_status: String = row.try_get("sensor_status")?;
    let admin_mode: String = row.try_get("admin_mode")?;

    Ok(ParkingSpace {
        node_id: row.try_get("node_id")?,
        sensor_status: sensor_status.parse::<SensorStatus>()?,
        distance_cm: row.try_get("distance_cm")?,
        reserved: row.try_get("reserved")?,
        reservation_start: row.try_get("reservation_start")?,
        reservation_expiry: row.try_get("reservation_expiry")?,
        qr_token: row.try_get("qr_token")?,
        checked_in: row.try_get("checked_in")?,
        checkin_time: row.try_get("checkin_time")?,
        admin_mode: admin_mode.parse::<AdminMode>()?,
        active_session_start: row.try_get("active_session_start")?,
        last_update: row.try_get("last_update")?,
        version: version_from_db(row.try_get("version")?)?,
    })
}

#[async_trait]
impl SpaceStore for PgStore {
    async fn get(&self, node_id: &str) -> Result<Option<ParkingSpace>> {
        let sql = format!("select {SPACE_COLUMNS} from parking_spaces where node_id = $1");
        let row = sqlx::query(&sql)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch space failed")?;

        row.as_ref().map(space_from_row).transpose()
    }

    async fn put(&self, space: &ParkingSpace, expected_version: Option<u64>) -> Result<PutOutcome> {
        let version = version_to_db(space.version)?;

        let affected = match expected_version {
            None => sqlx::query(
                r#"
                insert into parking_spaces (
                    node_id, sensor_status, distance_cm, reserved,
                    reservation_start, reservation_expiry, qr_token,
                    checked_in, checkin_time, admin_mode,
                    active_session_start, last_update, version
                )
                values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                on conflict (node_id) do nothing
                "#,
            )
            .bind(&space.node_id)
            .bind(space.sensor_status.as_str())
            .bind(space.distance_cm)
            .bind(space.reserved)
            .bind(space.reservation_start)
            .bind(space.reservation_expiry)
            .bind(space.qr_token.as_deref())
            .bind(space.checked_in)
            .bind(space.checkin_time)
            .bind(space.admin_mode.as_str())
            .bind(space.active_session_start)
            .bind(space.last_update)
            .bind(version)
            .execute(&self.pool)
            .await
            .context("insert space failed")?
            .rows_affected(),

            Some(expected) => sqlx::query(
                r#"
                update parking_spaces
                set sensor_status = $2,
                    distance_cm = $3,
                    reserved = $4,
                    reservation_start = $5,
                    reservation_expiry = $6,
                    qr_token = $7,
                    checked_in = $8,
                    checkin_time = $9,
                    admin_mode = $10,
                    active_session_start = $11,
                    last_update = $12,
                    version = $13
                where node_id = $1 and version = $14
                "#,
            )
            .bind(&space.node_id)
            .bind(space.sensor_status.as_str())
            .bind(space.distance_cm)
            .bind(space.reserved)
            .bind(space.reservation_start)
            .bind(space.reservation_expiry)
            .bind(space.qr_token.as_deref())
            .bind(space.checked_in)
            .bind(space.checkin_time)
            .bind(space.admin_mode.as_str())
            .bind(space.active_session_start)
            .bind(space.last_update)
            .bind(version)
            .bind(version_to_db(expected)?)
            .execute(&self.pool)
            .await
            .context("update space failed")?
            .rows_affected(),
        };

        if affected == 1 {
            return Ok(PutOutcome::Written);
        }

        Ok(PutOutcome::Conflict {
            current_version: self.current_version(&space.node_id).await?,
        })
    }

    async fn scan(&self) -> Result<Vec<ParkingSpace>> {
        let sql = format!("select {SPACE_COLUMNS} from parking_spaces order by node_id asc");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("scan spaces failed")?;

        rows.iter().map(space_from_row).collect()
    }
}

#[async_trait]
impl SessionLog for PgStore {
    async fn append(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            insert into parking_sessions (node_id, start_time, end_time, duration_seconds)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(&session.node_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.duration_seconds)
        .execute(&self.pool)
        .await
        .context("insert session failed")?;
        Ok(())
    }

    async fn sessions_since(&self, since: Option<EpochSecs>) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query(
            r#"
            select node_id, start_time, end_time, duration_seconds
            from parking_sessions
            where $1::bigint is null or end_time >= $1
            order by end_time asc, session_id asc
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("fetch sessions failed")?;

        rows.iter()
            .map(|row| -> Result<SessionRecord> {
                Ok(SessionRecord {
                    node_id: row.try_get("node_id")?,
                    start_time: row.try_get("start_time")?,
                    end_time: row.try_get("end_time")?,
                    duration_seconds: row.try_get("duration_seconds")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl HistoryLog for PgStore {
    async fn append(&self, reading: &SensorReading) -> Result<()> {
        sqlx::query(
            r#"
            insert into sensor_history (node_id, sensor_status, distance_cm, ts)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(&reading.node_id)
        .bind(reading.sensor_status.as_str())
        .bind(reading.distance_cm)
        .bind(reading.timestamp)
        .execute(&self.pool)
        .await
        .context("insert sensor reading failed")?;
        Ok(())
    }
}
