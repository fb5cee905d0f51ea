use serde::{Deserialize, Serialize};
use spk_schemas::{SensorStatus, SessionRecord};

/// Default reservation hold, in seconds.
pub const DEFAULT_RESERVATION_DURATION_SECS: i64 = 30;

/// Longest accepted reservation hold (one week).
pub const MAX_RESERVATION_DURATION_SECS: i64 = 7 * 24 * 3600;

/// Which FREE→OCCUPIED transitions open an occupancy session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// Every FREE→OCCUPIED transition opens a session, reserved or not.
    AllOccupancy,
    /// Occupancy that starts while a reservation is active is not counted.
    UnreservedOnly,
}

/// Policy config for the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Seconds from reservation until it auto-cancels.
    pub reservation_duration_secs: i64,
    pub session_policy: SessionPolicy,
}

impl EngineConfig {
    pub fn new(reservation_duration_secs: i64, session_policy: SessionPolicy) -> Self {
        debug_assert!(
            (1..=MAX_RESERVATION_DURATION_SECS).contains(&reservation_duration_secs),
            "reservation duration out of range: {reservation_duration_secs}"
        );
        Self {
            reservation_duration_secs,
            session_policy,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVATION_DURATION_SECS, SessionPolicy::AllOccupancy)
    }
}

/// Reservation request payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReservationRequest {
    /// Start (or restart) a reservation bound to `qr_token`.
    Reserve { qr_token: String },
    /// Cancel any active reservation.
    Release,
}

/// Zero or one incoming event for a space.
#[derive(Clone, Debug, PartialEq)]
pub enum SpaceEvent {
    /// No event: only enforce expiry.
    Tick,
    Sensor {
        sensor_status: SensorStatus,
        distance_cm: f64,
    },
    Reservation(ReservationRequest),
    CheckIn {
        token: String,
    },
    Maintenance,
    Resume,
}

impl SpaceEvent {
    /// Stable name used in audit records and logs.
    pub fn name(&self) -> &'static str {
        match self {
            SpaceEvent::Tick => "EXPIRY_CHECK",
            SpaceEvent::Sensor { .. } => "SENSOR_UPDATE",
            SpaceEvent::Reservation(ReservationRequest::Reserve { .. }) => "RESERVE",
            SpaceEvent::Reservation(ReservationRequest::Release) => "RELEASE",
            SpaceEvent::CheckIn { .. } => "CHECK_IN",
            SpaceEvent::Maintenance => "ADMIN_MAINTENANCE",
            SpaceEvent::Resume => "ADMIN_RESUME",
        }
    }
}

/// Result of applying one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Whether a stale reservation was cleared before the event.
    pub expired: bool,
    /// Whether the record changed and must be persisted.
    pub changed: bool,
    /// Completed occupancy interval, if this event closed one.
    pub session: Option<SessionRecord>,
}

/// The reason an event was rejected. Nothing is mutated when one is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// No active reservation to act on.
    NotFound,
    /// Reservation requested while the space is under maintenance.
    PreconditionFailed,
    /// The reservation has already been redeemed.
    AlreadyCheckedIn,
    /// Presented token does not match the active reservation.
    InvalidToken,
    /// Distance is negative or not a finite number.
    InvalidReading,
    /// `now + reservation_duration_secs` does not fit in an epoch second.
    DeadlineOutOfRange,
}

impl EngineError {
    /// Machine-readable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound => "NOT_FOUND",
            EngineError::PreconditionFailed => "PRECONDITION_FAILED",
            EngineError::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            EngineError::InvalidToken => "INVALID_TOKEN",
            EngineError::InvalidReading => "INVALID_READING",
            EngineError::DeadlineOutOfRange => "DEADLINE_OUT_OF_RANGE",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound => write!(f, "NOT_FOUND: no active reservation"),
            EngineError::PreconditionFailed => {
                write!(f, "PRECONDITION_FAILED: space is under maintenance")
            }
            EngineError::AlreadyCheckedIn => {
                write!(f, "ALREADY_CHECKED_IN: reservation already redeemed")
            }
            EngineError::InvalidToken => write!(f, "INVALID_TOKEN: qr token does not match"),
            EngineError::InvalidReading => {
                write!(f, "INVALID_READING: distance must be a finite, non-negative number")
            }
            EngineError::DeadlineOutOfRange => {
                write!(f, "DEADLINE_OUT_OF_RANGE: reservation deadline overflows")
            }
        }
    }
}

impl std::error::Error for EngineError {}
