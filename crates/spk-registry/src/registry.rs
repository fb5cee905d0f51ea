use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use spk_audit::AuditWriter;
use spk_db::{HistoryLog, MemStore, PutOutcome, SessionLog, SpaceStore};
use spk_engine::{
    apply_event, final_status, project_view, EngineConfig, ReservationRequest, SpaceEvent,
    Transition,
};
use spk_schemas::{
    EpochSecs, NodeUsage, ParkingSpace, SensorReading, SensorStatus, SessionRecord, SessionRow,
    SpaceView, UsageSummary,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analytics::{self, AnalyticsRange};
use crate::{NodeLocks, RegistryError};

pub const AUDIT_TOPIC: &str = "SPACE";
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;

/// A best-effort append that failed without failing the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedWrite {
    SessionLog,
    History,
    Audit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAck {
    pub view: SpaceView,
    /// Session closed by this reading, if any.
    pub session: Option<SessionRecord>,
    pub warnings: Vec<DegradedWrite>,
}

/// Result of a reserve/release request. Token and deadline are `None` on
/// release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationTicket {
    pub view: SpaceView,
    pub qr_token: Option<String>,
    pub expires_at: Option<EpochSecs>,
    pub warnings: Vec<DegradedWrite>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInAck {
    pub view: SpaceView,
    pub warnings: Vec<DegradedWrite>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminAck {
    pub view: SpaceView,
    pub warnings: Vec<DegradedWrite>,
}

/// Outcome of one serialized load → apply → put cycle.
struct Committed {
    op: &'static str,
    space: ParkingSpace,
    transition: Transition,
    /// The audit append for this transition failed.
    audit_failed: bool,
}

/// Owns the record of every space and serializes all updates per node.
///
/// Each operation holds the node's lock across load, engine apply, the
/// conditional put and the audit append, so a node's audit events follow its
/// version order. Session and history appends run after release.
pub struct SpaceRegistry {
    store: Arc<dyn SpaceStore>,
    sessions: Arc<dyn SessionLog>,
    history: Arc<dyn HistoryLog>,
    audit: Option<Arc<Mutex<AuditWriter>>>,
    cfg: EngineConfig,
    max_write_attempts: u32,
    analytics_tz: Tz,
    locks: NodeLocks,
}

impl SpaceRegistry {
    pub fn new(
        store: Arc<dyn SpaceStore>,
        sessions: Arc<dyn SessionLog>,
        history: Arc<dyn HistoryLog>,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            history,
            audit: None,
            cfg,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            analytics_tz: Tz::UTC,
            locks: NodeLocks::new(),
        }
    }

    /// All three collaborators backed by one in-memory store.
    pub fn in_memory(store: Arc<MemStore>, cfg: EngineConfig) -> Self {
        Self::new(store.clone(), store.clone(), store, cfg)
    }

    pub fn with_audit(mut self, writer: AuditWriter) -> Self {
        self.audit = Some(Arc::new(Mutex::new(writer)));
        self
    }

    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    pub fn with_analytics_tz(mut self, tz: Tz) -> Self {
        self.analytics_tz = tz;
        self
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.cfg
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Load the record, creating and persisting the default if absent.
    pub async fn get_or_create(
        &self,
        node_id: &str,
        now: EpochSecs,
    ) -> Result<ParkingSpace, RegistryError> {
        let c = self.commit(node_id, &SpaceEvent::Tick, true, now).await?;
        self.after_commit(&c, None).await;
        Ok(c.space)
    }

    /// Create any missing spaces. Existing records are left as they are.
    pub async fn seed(&self, node_ids: &[String], now: EpochSecs) -> Result<usize, RegistryError> {
        let mut created = 0;
        for node_id in node_ids {
            let existed = self
                .store
                .get(node_id)
                .await
                .map_err(RegistryError::Storage)?
                .is_some();
            self.get_or_create(node_id, now).await?;
            if !existed {
                created += 1;
            }
        }
        info!(requested = node_ids.len(), created, "seeded spaces");
        Ok(created)
    }

    /// Apply a sensor reading; unknown nodes are created on the fly.
    pub async fn update_sensor(
        &self,
        node_id: &str,
        sensor_status: SensorStatus,
        distance_cm: f64,
        now: EpochSecs,
    ) -> Result<SensorAck, RegistryError> {
        let event = SpaceEvent::Sensor {
            sensor_status,
            distance_cm,
        };
        let c = self.commit(node_id, &event, true, now).await?;

        let reading = SensorReading {
            node_id: node_id.to_string(),
            sensor_status,
            distance_cm,
            timestamp: now,
        };
        let warnings = self.after_commit(&c, Some(reading)).await;

        Ok(SensorAck {
            view: project_view(&c.space),
            session: c.transition.session,
            warnings,
        })
    }

    /// Start (`reserved = true`) or cancel a reservation. A fresh token is
    /// issued per request.
    pub async fn reserve(
        &self,
        node_id: &str,
        reserved: bool,
        now: EpochSecs,
    ) -> Result<ReservationTicket, RegistryError> {
        let request = if reserved {
            ReservationRequest::Reserve {
                qr_token: Uuid::new_v4().to_string(),
            }
        } else {
            ReservationRequest::Release
        };
        let c = self
            .commit(node_id, &SpaceEvent::Reservation(request), false, now)
            .await?;
        let warnings = self.after_commit(&c, None).await;

        Ok(ReservationTicket {
            view: project_view(&c.space),
            qr_token: c.space.qr_token.clone(),
            expires_at: c.space.reservation_expiry,
            warnings,
        })
    }

    pub async fn check_in(
        &self,
        node_id: &str,
        token: &str,
        now: EpochSecs,
    ) -> Result<CheckInAck, RegistryError> {
        let event = SpaceEvent::CheckIn {
            token: token.to_string(),
        };
        let c = self.commit(node_id, &event, false, now).await?;
        let warnings = self.after_commit(&c, None).await;
        Ok(CheckInAck {
            view: project_view(&c.space),
            warnings,
        })
    }

    pub async fn set_maintenance(
        &self,
        node_id: &str,
        now: EpochSecs,
    ) -> Result<AdminAck, RegistryError> {
        self.admin(node_id, SpaceEvent::Maintenance, now).await
    }

    pub async fn resume(&self, node_id: &str, now: EpochSecs) -> Result<AdminAck, RegistryError> {
        self.admin(node_id, SpaceEvent::Resume, now).await
    }

    async fn admin(
        &self,
        node_id: &str,
        event: SpaceEvent,
        now: EpochSecs,
    ) -> Result<AdminAck, RegistryError> {
        let c = self.commit(node_id, &event, false, now).await?;
        let warnings = self.after_commit(&c, None).await;
        info!(node_id, op = event.name(), version = c.space.version, "admin override");
        Ok(AdminAck {
            view: project_view(&c.space),
            warnings,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every stored space with expiry enforced. Expiries that fire are
    /// persisted under the node's lock.
    pub async fn status_snapshot(
        &self,
        now: EpochSecs,
    ) -> Result<BTreeMap<String, SpaceView>, RegistryError> {
        let spaces = self.store.scan().await.map_err(RegistryError::Storage)?;

        let mut out = BTreeMap::new();
        for space in spaces {
            let view = if expiry_due(&space, now) {
                self.expire(&space.node_id, now).await?
            } else {
                project_view(&space)
            };
            out.insert(view.node_id.clone(), view);
        }
        Ok(out)
    }

    /// Single-node version of [`Self::status_snapshot`].
    pub async fn space(&self, node_id: &str, now: EpochSecs) -> Result<SpaceView, RegistryError> {
        let space = self
            .store
            .get(node_id)
            .await
            .map_err(RegistryError::Storage)?
            .ok_or_else(|| RegistryError::UnknownNode(node_id.to_string()))?;

        if expiry_due(&space, now) {
            return self.expire(node_id, now).await;
        }
        Ok(project_view(&space))
    }

    async fn expire(&self, node_id: &str, now: EpochSecs) -> Result<SpaceView, RegistryError> {
        let c = self.commit(node_id, &SpaceEvent::Tick, false, now).await?;
        self.after_commit(&c, None).await;
        Ok(project_view(&c.space))
    }

    async fn sessions_in(
        &self,
        range: AnalyticsRange,
        now: EpochSecs,
    ) -> Result<Vec<SessionRecord>, RegistryError> {
        self.sessions
            .sessions_since(range.since(now, self.analytics_tz))
            .await
            .map_err(RegistryError::Storage)
    }

    pub async fn usage_by_node(
        &self,
        range: AnalyticsRange,
        now: EpochSecs,
    ) -> Result<Vec<NodeUsage>, RegistryError> {
        Ok(analytics::usage_by_node(&self.sessions_in(range, now).await?))
    }

    pub async fn usage_summary(
        &self,
        range: AnalyticsRange,
        now: EpochSecs,
    ) -> Result<UsageSummary, RegistryError> {
        Ok(analytics::usage_summary(&self.sessions_in(range, now).await?))
    }

    pub async fn recent_sessions(
        &self,
        limit: usize,
        range: AnalyticsRange,
        now: EpochSecs,
    ) -> Result<Vec<SessionRow>, RegistryError> {
        Ok(analytics::recent_sessions(
            &self.sessions_in(range, now).await?,
            limit,
        ))
    }

    // -----------------------------------------------------------------------
    // Core cycle
    // -----------------------------------------------------------------------

    /// Serialized load → apply → conditional put → audit, retried on version
    /// conflicts. The node lock is released when this returns.
    async fn commit(
        &self,
        node_id: &str,
        event: &SpaceEvent,
        create_if_missing: bool,
        now: EpochSecs,
    ) -> Result<Committed, RegistryError> {
        let _guard = self.locks.lock(node_id).await;

        for attempt in 1..=self.max_write_attempts {
            let loaded = self
                .store
                .get(node_id)
                .await
                .map_err(RegistryError::Storage)?;

            let (mut space, expected) = match loaded {
                Some(s) => {
                    let v = s.version;
                    (s, Some(v))
                }
                None if create_if_missing => (ParkingSpace::new_default(node_id, now), None),
                None => return Err(RegistryError::UnknownNode(node_id.to_string())),
            };

            let transition = apply_event(&self.cfg, &mut space, event, now)?;

            if expected.is_some() && !transition.changed {
                return Ok(Committed {
                    op: event.name(),
                    space,
                    transition,
                    audit_failed: false,
                });
            }

            space.version = match expected {
                Some(v) => v + 1,
                None if transition.changed => 1,
                None => 0,
            };

            let op = if expected.is_none() && !transition.changed {
                "CREATE"
            } else {
                event.name()
            };

            match self
                .store
                .put(&space, expected)
                .await
                .map_err(RegistryError::Storage)?
            {
                PutOutcome::Written => {
                    debug!(
                        node_id,
                        op,
                        version = space.version,
                        expired = transition.expired,
                        "space committed"
                    );
                    let mut c = Committed {
                        op,
                        space,
                        transition,
                        audit_failed: false,
                    };
                    if let Err(e) = self.audit_transition(&c) {
                        warn!(node_id, error = %format!("{e:#}"), "audit append failed");
                        c.audit_failed = true;
                    }
                    return Ok(c);
                }
                PutOutcome::Conflict { current_version } => {
                    warn!(
                        node_id,
                        attempt,
                        expected = ?expected,
                        current = ?current_version,
                        "space write lost to a concurrent writer; retrying"
                    );
                }
            }
        }

        Err(RegistryError::Conflict {
            node_id: node_id.to_string(),
            attempts: self.max_write_attempts,
        })
    }

    /// Best-effort session and history appends. Failures, including the audit
    /// append made under the lock, are returned as warnings.
    async fn after_commit(
        &self,
        c: &Committed,
        reading: Option<SensorReading>,
    ) -> Vec<DegradedWrite> {
        let mut warnings = Vec::new();
        let node_id = c.space.node_id.as_str();

        if let Some(session) = &c.transition.session {
            if let Err(e) = self.sessions.append(session).await {
                warn!(node_id, error = %format!("{e:#}"), "session append failed");
                warnings.push(DegradedWrite::SessionLog);
            }
        }

        if let Some(reading) = reading {
            if let Err(e) = self.history.append(&reading).await {
                warn!(node_id, error = %format!("{e:#}"), "sensor history append failed");
                warnings.push(DegradedWrite::History);
            }
        }

        if c.audit_failed {
            warnings.push(DegradedWrite::Audit);
        }

        warnings
    }

    fn audit_transition(&self, c: &Committed) -> anyhow::Result<()> {
        let Some(audit) = &self.audit else {
            return Ok(());
        };

        let mut payload = json!({
            "node_id": c.space.node_id,
            "version": c.space.version,
            "final_status": final_status(&c.space),
            "sensor_status": c.space.sensor_status,
            "admin_mode": c.space.admin_mode,
            "expired": c.transition.expired,
        });
        if let Some(session) = &c.transition.session {
            payload["session_duration_seconds"] = json!(session.duration_seconds);
        }

        let mut w = audit.lock().unwrap_or_else(PoisonError::into_inner);
        w.append(&c.space.node_id, AUDIT_TOPIC, c.op, payload)?;
        Ok(())
    }
}

fn expiry_due(space: &ParkingSpace, now: EpochSecs) -> bool {
    space.reserved && space.reservation_expiry.is_some_and(|t| now >= t)
}
