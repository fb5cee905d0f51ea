use spk_schemas::{
    ts_readable, AdminMode, EpochSecs, FinalStatus, ParkingSpace, SensorStatus, SessionRecord,
    SpaceView,
};

use crate::{EngineConfig, EngineError, ReservationRequest, SessionPolicy, SpaceEvent, Transition};

/// Derive the user/admin-facing status. First match wins:
///
/// 1. maintenance
/// 2. reserved, not checked in, sensor occupied → violation
/// 3. reserved
/// 4. raw sensor status
pub fn derive_final_status(
    sensor_status: SensorStatus,
    reserved: bool,
    admin_mode: AdminMode,
    checked_in: bool,
) -> FinalStatus {
    if admin_mode == AdminMode::Maintenance {
        return FinalStatus::Maintenance;
    }
    if reserved && !checked_in && sensor_status == SensorStatus::Occupied {
        return FinalStatus::Violation;
    }
    if reserved {
        return FinalStatus::Reserved;
    }
    sensor_status.into()
}

pub fn final_status(space: &ParkingSpace) -> FinalStatus {
    derive_final_status(
        space.sensor_status,
        space.reserved,
        space.admin_mode,
        space.checked_in,
    )
}

/// `true` for a reserved-but-not-checked-in space the sensor reports occupied.
pub fn is_violation(space: &ParkingSpace) -> bool {
    final_status(space) == FinalStatus::Violation
}

/// Clear a reservation whose deadline has passed. Returns `true` if it fired.
///
/// Idempotent: a second call on the same record is a no-op.
pub fn apply_expiry(space: &mut ParkingSpace, now: EpochSecs) -> bool {
    match space.reservation_expiry {
        Some(expiry) if space.reserved && now >= expiry => {
            space.clear_reservation();
            space.last_update = now;
            true
        }
        _ => false,
    }
}

/// Apply a sensor reading. Returns the session closed by this reading, if any.
pub fn apply_sensor_update(
    cfg: &EngineConfig,
    space: &mut ParkingSpace,
    sensor_status: SensorStatus,
    distance_cm: f64,
    now: EpochSecs,
) -> Result<Option<SessionRecord>, EngineError> {
    if !distance_cm.is_finite() || distance_cm < 0.0 {
        return Err(EngineError::InvalidReading);
    }

    apply_expiry(space, now);

    let previous = space.sensor_status;
    let mut closed = None;

    match (previous, sensor_status) {
        (SensorStatus::Free, SensorStatus::Occupied) => {
            let counts = match cfg.session_policy {
                SessionPolicy::AllOccupancy => true,
                SessionPolicy::UnreservedOnly => !space.reserved,
            };
            if counts {
                space.active_session_start = Some(now);
            }
        }
        (SensorStatus::Occupied, SensorStatus::Free) => {
            if let Some(start) = space.active_session_start.take() {
                // A wall-clock step backwards must not yield a negative duration.
                let end = now.max(start);
                closed = Some(SessionRecord::closed(space.node_id.clone(), start, end));
            }
        }
        // FREE→FREE, OCCUPIED→OCCUPIED: session fields untouched.
        _ => {}
    }

    space.sensor_status = sensor_status;
    space.distance_cm = distance_cm;
    space.last_update = now;

    Ok(closed)
}

/// Start or cancel a reservation.
pub fn apply_reservation_request(
    cfg: &EngineConfig,
    space: &mut ParkingSpace,
    request: &ReservationRequest,
    now: EpochSecs,
) -> Result<(), EngineError> {
    let mut next = space.clone();
    apply_expiry(&mut next, now);

    if next.admin_mode == AdminMode::Maintenance {
        return Err(EngineError::PreconditionFailed);
    }

    match request {
        ReservationRequest::Reserve { qr_token } => {
            let expiry = now
                .checked_add(cfg.reservation_duration_secs)
                .ok_or(EngineError::DeadlineOutOfRange)?;
            next.reserved = true;
            next.reservation_start = Some(now);
            next.reservation_expiry = Some(expiry);
            next.qr_token = Some(qr_token.clone());
            next.checked_in = false;
            next.checkin_time = None;
        }
        ReservationRequest::Release => next.clear_reservation(),
    }
    next.last_update = now;

    *space = next;
    Ok(())
}

/// Redeem the QR token of the active reservation.
///
/// Checked in order: no active reservation (a stale token therefore yields
/// `NotFound`), already checked in, token mismatch.
pub fn apply_check_in(
    space: &mut ParkingSpace,
    presented_token: &str,
    now: EpochSecs,
) -> Result<(), EngineError> {
    let mut next = space.clone();
    apply_expiry(&mut next, now);

    if !next.reserved {
        return Err(EngineError::NotFound);
    }
    if next.checked_in {
        return Err(EngineError::AlreadyCheckedIn);
    }
    if next.qr_token.as_deref() != Some(presented_token) {
        return Err(EngineError::InvalidToken);
    }

    next.checked_in = true;
    next.checkin_time = Some(now);
    next.last_update = now;

    *space = next;
    Ok(())
}

/// Force maintenance mode and drop any reservation.
///
/// Sensor and session fields are left alone: an occupied space stays
/// sensor-OCCUPIED while under maintenance.
pub fn apply_admin_maintenance(space: &mut ParkingSpace, now: EpochSecs) {
    space.admin_mode = AdminMode::Maintenance;
    space.clear_reservation();
    space.last_update = now;
}

/// Return to normal operation. A reservation cleared by maintenance is not
/// restored.
pub fn apply_admin_resume(space: &mut ParkingSpace, now: EpochSecs) {
    space.admin_mode = AdminMode::Normal;
    space.last_update = now;
}

/// Apply zero or one event, enforcing expiry first.
///
/// On `Err` the record is exactly as it was passed in.
pub fn apply_event(
    cfg: &EngineConfig,
    space: &mut ParkingSpace,
    event: &SpaceEvent,
    now: EpochSecs,
) -> Result<Transition, EngineError> {
    let mut next = space.clone();
    let expired = apply_expiry(&mut next, now);

    let mut session = None;
    match event {
        SpaceEvent::Tick => {
            *space = next;
            return Ok(Transition {
                expired,
                changed: expired,
                session: None,
            });
        }
        SpaceEvent::Sensor {
            sensor_status,
            distance_cm,
        } => {
            session = apply_sensor_update(cfg, &mut next, *sensor_status, *distance_cm, now)?;
        }
        SpaceEvent::Reservation(req) => apply_reservation_request(cfg, &mut next, req, now)?,
        SpaceEvent::CheckIn { token } => apply_check_in(&mut next, token, now)?,
        SpaceEvent::Maintenance => apply_admin_maintenance(&mut next, now),
        SpaceEvent::Resume => apply_admin_resume(&mut next, now),
    }

    *space = next;
    Ok(Transition {
        expired,
        changed: true,
        session,
    })
}

/// Project the read-only view. The only place `final_status` and
/// `violation` are computed for callers.
pub fn project_view(space: &ParkingSpace) -> SpaceView {
    let status = final_status(space);
    SpaceView {
        node_id: space.node_id.clone(),
        final_status: status,
        sensor_status: space.sensor_status,
        distance_cm: space.distance_cm,
        reserved: space.reserved,
        checked_in: space.checked_in,
        violation: status == FinalStatus::Violation,
        admin_mode: space.admin_mode,
        qr_token: space.qr_token.clone(),
        reservation_expiry: space.reservation_expiry,
        last_update: space.last_update,
        last_update_readable: ts_readable(space.last_update),
        version: space.version,
    }
}
