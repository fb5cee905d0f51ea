use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f2c_8a1e_6b7d_4c3a_9e0f_1d2b_3c4d_5e6f);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub node_id: String,
    pub recorded_at: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// SHA-256 (hex) of the event's canonical form with `hash_self` blanked.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let unsealed = AuditEvent {
        hash_self: None,
        ..ev.clone()
    };
    let digest = Sha256::digest(canonical_json(&unsealed)?.as_bytes());
    Ok(hex::encode(digest))
}

/// Same chain position and payload always give the same id.
pub(crate) fn derive_event_id(prev: Option<&str>, seq: u64, payload: &Value) -> Result<Uuid> {
    let name = format!("{}|{}|{}", prev.unwrap_or_default(), seq, canonical_json(payload)?);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()))
}

/// Compact JSON with object keys in lexicographic order at every depth.
pub(crate) fn canonical_json<T: Serialize>(v: &T) -> Result<String> {
    let value = serde_json::to_value(v).context("serialize audit event")?;
    serde_json::to_string(&Canonical(&value)).context("encode audit event")
}

struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let sorted: BTreeMap<&str, Canonical<'_>> =
                    map.iter().map(|(k, v)| (k.as_str(), Canonical(v))).collect();
                sorted.serialize(s)
            }
            Value::Array(items) => s.collect_seq(items.iter().map(Canonical)),
            other => other.serialize(s),
        }
    }
}
