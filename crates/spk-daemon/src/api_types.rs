//! Request and response types for the spk-daemon HTTP endpoints.
//!
//! No business logic lives here.

use serde::{Deserialize, Serialize};
use spk_registry::{AdminAck, CheckInAck, DegradedWrite, ReservationTicket, SensorAck};
use spk_schemas::{EpochSecs, FinalStatus, SensorStatus, SessionRecord, SpaceView};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

/// Body of every non-2xx response: `"<CODE>: <message>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// POST /api/node/update
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorUpdateRequest {
    pub node_id: String,
    pub sensor_status: SensorStatus,
    pub distance_cm: f64,
    /// Device-side clock. Accepted for compatibility, not used: events are
    /// stamped with the server clock.
    #[serde(default)]
    pub timestamp: Option<EpochSecs>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorUpdateResponse {
    pub status: &'static str,
    pub final_status: FinalStatus,
    pub session: Option<SessionRecord>,
    pub space: SpaceView,
    pub warnings: Vec<DegradedWrite>,
}

impl From<SensorAck> for SensorUpdateResponse {
    fn from(ack: SensorAck) -> Self {
        Self {
            status: "ok",
            final_status: ack.view.final_status,
            session: ack.session,
            space: ack.view,
            warnings: ack.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/reserve
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub node_id: String,
    pub reserved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReserveResponse {
    pub status: &'static str,
    pub qr_token: Option<String>,
    pub expires_at: Option<EpochSecs>,
    pub space: SpaceView,
    pub warnings: Vec<DegradedWrite>,
}

impl From<ReservationTicket> for ReserveResponse {
    fn from(t: ReservationTicket) -> Self {
        Self {
            status: "ok",
            qr_token: t.qr_token,
            expires_at: t.expires_at,
            space: t.view,
            warnings: t.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/checkin, /api/admin/{maintenance,resume}/:node_id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub node_id: String,
    pub qr_token: String,
}

/// Shared shape for check-in and admin overrides.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceAckResponse {
    pub status: &'static str,
    pub space: SpaceView,
    pub warnings: Vec<DegradedWrite>,
}

impl From<CheckInAck> for SpaceAckResponse {
    fn from(a: CheckInAck) -> Self {
        Self {
            status: "ok",
            space: a.view,
            warnings: a.warnings,
        }
    }
}

impl From<AdminAck> for SpaceAckResponse {
    fn from(a: AdminAck) -> Self {
        Self {
            status: "ok",
            space: a.view,
            warnings: a.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Analytics query strings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentQuery {
    pub range: Option<String>,
    pub limit: Option<usize>,
}
