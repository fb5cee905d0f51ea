//! Shared runtime state for spk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The registry owns all
//! space state; this module only adds the SSE bus and the clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spk_db::MemStore;
use spk_engine::EngineConfig;
use spk_registry::{Clock, SpaceRegistry, SystemClock};
use spk_schemas::{EpochSecs, SpaceView};
use tokio::sync::broadcast;
use tracing::warn;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    /// A space's record was committed.
    Space(SpaceView),
    LogLine { level: String, msg: String },
}

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub registry: Arc<SpaceRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(registry: SpaceRegistry, clock: Arc<dyn Clock>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "spk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            registry: Arc::new(registry),
            clock,
        }
    }

    /// In-memory registry on the wall clock.
    pub fn in_memory(cfg: EngineConfig) -> Self {
        let store = Arc::new(MemStore::new());
        Self::new(
            SpaceRegistry::in_memory(store, cfg),
            Arc::new(SystemClock),
        )
    }

    pub fn now(&self) -> EpochSecs {
        self.clock.now()
    }

    /// Publish a committed view. No subscribers is not an error.
    pub fn publish(&self, view: &SpaceView) {
        let _ = self.bus.send(BusMsg::Space(view.clone()));
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn a background task that reads the snapshot every `interval`, which
/// enforces (and persists) due expiries even when no client is asking.
///
/// Views whose version moved since the previous sweep are published on the
/// bus so SSE clients see reservations lapse.
pub fn spawn_expiry_sweep(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut seen: HashMap<String, u64> = HashMap::new();
        loop {
            ticker.tick().await;
            match state.registry.status_snapshot(state.now()).await {
                Ok(views) => {
                    for (node_id, view) in views {
                        if seen.get(&node_id) != Some(&view.version) {
                            seen.insert(node_id, view.version);
                            state.publish(&view);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "expiry sweep failed");
                    let _ = state.bus.send(BusMsg::LogLine {
                        level: "WARN".to_string(),
                        msg: format!("expiry sweep failed: {e}"),
                    });
                }
            }
        }
    });
}
