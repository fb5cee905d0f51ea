//! spk-registry
//!
//! Orchestrates every space update: per-node serialization, lazy creation,
//! engine apply, conditional persistence with bounded retries, and the
//! best-effort session / history / audit appends that follow a commit.
//!
//! Also serves the status snapshot (the only place `final_status` is computed
//! for callers) and the analytics read model over the session log.

pub mod analytics;
mod clock;
mod error;
mod locks;
mod registry;

pub use analytics::{AnalyticsRange, DEFAULT_RECENT_LIMIT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::RegistryError;
pub use locks::NodeLocks;
pub use registry::{
    AdminAck, CheckInAck, DegradedWrite, ReservationTicket, SensorAck, SpaceRegistry, AUDIT_TOPIC,
    DEFAULT_MAX_WRITE_ATTEMPTS,
};
