//! spk-schemas
//!
//! Shared record, event and read-model types for the parking workspace.
//! No business logic lives here: the reconciliation rules are in
//! `spk-engine`, the orchestration in `spk-registry`.
//!
//! Timestamps are integer epoch seconds throughout.

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Epoch seconds (UTC).
pub type EpochSecs = i64;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Raw sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorStatus {
    Free,
    Occupied,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Free => "FREE",
            SensorStatus::Occupied => "OCCUPIED",
        }
    }
}

/// Administrative override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminMode {
    Normal,
    Maintenance,
}

impl AdminMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminMode::Normal => "NORMAL",
            AdminMode::Maintenance => "MAINTENANCE",
        }
    }
}

/// User/admin-facing status. Always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Maintenance,
    Violation,
    Reserved,
    Free,
    Occupied,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Maintenance => "MAINTENANCE",
            FinalStatus::Violation => "VIOLATION",
            FinalStatus::Reserved => "RESERVED",
            FinalStatus::Free => "FREE",
            FinalStatus::Occupied => "OCCUPIED",
        }
    }
}

impl From<SensorStatus> for FinalStatus {
    fn from(s: SensorStatus) -> Self {
        match s {
            SensorStatus::Free => FinalStatus::Free,
            SensorStatus::Occupied => FinalStatus::Occupied,
        }
    }
}

/// Error for text columns / query params that do not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for SensorStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(SensorStatus::Free),
            "OCCUPIED" => Ok(SensorStatus::Occupied),
            _ => Err(UnknownVariant {
                kind: "sensor_status",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for AdminMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Ok(AdminMode::Normal),
            "MAINTENANCE" => Ok(AdminMode::Maintenance),
            _ => Err(UnknownVariant {
                kind: "admin_mode",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ParkingSpace
// ---------------------------------------------------------------------------

/// Persisted record for one physical space, keyed by `node_id`.
///
/// `final_status` and `violation` are intentionally absent: both are derived
/// from `(sensor_status, reserved, admin_mode, checked_in)` on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSpace {
    pub node_id: String,
    pub sensor_status: SensorStatus,
    pub distance_cm: f64,
    pub reserved: bool,
    pub reservation_start: Option<EpochSecs>,
    pub reservation_expiry: Option<EpochSecs>,
    pub qr_token: Option<String>,
    pub checked_in: bool,
    pub checkin_time: Option<EpochSecs>,
    pub admin_mode: AdminMode,
    pub active_session_start: Option<EpochSecs>,
    pub last_update: EpochSecs,
    /// Per-node sequence counter; +1 on every persisted transition.
    pub version: u64,
}

impl ParkingSpace {
    /// Default record for a space seen for the first time.
    pub fn new_default(node_id: impl Into<String>, now: EpochSecs) -> Self {
        Self {
            node_id: node_id.into(),
            sensor_status: SensorStatus::Free,
            distance_cm: 0.0,
            reserved: false,
            reservation_start: None,
            reservation_expiry: None,
            qr_token: None,
            checked_in: false,
            checkin_time: None,
            admin_mode: AdminMode::Normal,
            active_session_start: None,
            last_update: now,
            version: 0,
        }
    }

    /// Clear every reservation-bound field together.
    pub fn clear_reservation(&mut self) {
        self.reserved = false;
        self.reservation_start = None;
        self.reservation_expiry = None;
        self.qr_token = None;
        self.checked_in = false;
        self.checkin_time = None;
    }
}

// ---------------------------------------------------------------------------
// Append-only records
// ---------------------------------------------------------------------------

/// One completed occupancy interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub node_id: String,
    pub start_time: EpochSecs,
    pub end_time: EpochSecs,
    pub duration_seconds: i64,
}

impl SessionRecord {
    /// A clock that stepped backwards yields a zero-length session.
    pub fn closed(node_id: impl Into<String>, start_time: EpochSecs, end_time: EpochSecs) -> Self {
        Self {
            node_id: node_id.into(),
            start_time,
            end_time,
            duration_seconds: end_time.saturating_sub(start_time).max(0),
        }
    }
}

/// Raw sensor reading kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub node_id: String,
    pub sensor_status: SensorStatus,
    pub distance_cm: f64,
    pub timestamp: EpochSecs,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Read-only projection served by the status path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceView {
    pub node_id: String,
    pub final_status: FinalStatus,
    pub sensor_status: SensorStatus,
    pub distance_cm: f64,
    pub reserved: bool,
    pub checked_in: bool,
    pub violation: bool,
    pub admin_mode: AdminMode,
    pub qr_token: Option<String>,
    pub reservation_expiry: Option<EpochSecs>,
    pub last_update: EpochSecs,
    pub last_update_readable: Option<String>,
    pub version: u64,
}

/// Per-node usage aggregate over the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUsage {
    pub node_id: String,
    pub total_sessions: u64,
    pub total_time_seconds: i64,
    pub average_time_seconds: f64,
}

/// Fleet-wide usage aggregate over the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_sessions: u64,
    pub total_time_seconds: i64,
    pub average_time_seconds: f64,
}

/// A session row decorated for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub node_id: String,
    pub start_time: EpochSecs,
    pub end_time: EpochSecs,
    pub duration_seconds: i64,
    pub start_time_readable: Option<String>,
    pub end_time_readable: Option<String>,
}

impl From<&SessionRecord> for SessionRow {
    fn from(s: &SessionRecord) -> Self {
        Self {
            node_id: s.node_id.clone(),
            start_time: s.start_time,
            end_time: s.end_time,
            duration_seconds: s.duration_seconds,
            start_time_readable: ts_readable(s.start_time),
            end_time_readable: ts_readable(s.end_time),
        }
    }
}

/// `"%Y-%m-%d %H:%M:%S UTC"`; `None` for zero or out-of-range timestamps.
pub fn ts_readable(ts: EpochSecs) -> Option<String> {
    if ts == 0 {
        return None;
    }
    DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}
