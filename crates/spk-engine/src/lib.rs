//! spk-engine
//!
//! Per-space reconciliation engine.
//!
//! Architectural decisions:
//! - Final status is derived, never stored (fixed priority order)
//! - Expiry is enforced lazily, before any other event is evaluated
//! - Sessions are paired by observed sensor transitions, not wall-clock
//! - Every operation fully applies or is rejected with no mutation
//!
//! Pure deterministic logic. No IO, no wall-clock, no randomness. The caller
//! supplies `now` and any fresh QR token.

mod engine;
mod types;

pub use engine::{
    apply_admin_maintenance, apply_admin_resume, apply_check_in, apply_event, apply_expiry,
    apply_reservation_request, apply_sensor_update, derive_final_status, final_status,
    is_violation, project_view,
};
pub use types::*;
