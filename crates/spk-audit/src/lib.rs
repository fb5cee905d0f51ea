//! Append-only audit trail for space transitions.
//!
//! One JSON object per line. With chaining on, every event commits to the
//! previous one through `hash_prev` and carries its own SHA-256 in
//! `hash_self`, so any edit to an earlier line is detectable.

mod chain;
mod event;
mod writer;

pub use chain::{verify_hash_chain, verify_hash_chain_str, VerifyResult};
pub use event::{compute_event_hash, AuditEvent};
pub use writer::AuditWriter;
