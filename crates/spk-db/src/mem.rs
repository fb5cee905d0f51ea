//! In-process backend.
//!
//! Single-process only and not durable: everything is lost on exit. Locks are
//! never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use spk_schemas::{EpochSecs, ParkingSpace, SensorReading, SessionRecord};

use crate::{HistoryLog, PutOutcome, SessionLog, SpaceStore};

fn poison_err<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow!("mem store lock poisoned")
}

#[derive(Debug, Default)]
pub struct MemStore {
    spaces: RwLock<BTreeMap<String, ParkingSpace>>,
    sessions: RwLock<Vec<SessionRecord>>,
    history: RwLock<Vec<SensorReading>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded reading, in append order.
    pub fn history(&self) -> Result<Vec<SensorReading>> {
        Ok(self.history.read().map_err(poison_err)?.clone())
    }
}

#[async_trait]
impl SpaceStore for MemStore {
    async fn get(&self, node_id: &str) -> Result<Option<ParkingSpace>> {
        Ok(self.spaces.read().map_err(poison_err)?.get(node_id).cloned())
    }

    async fn put(&self, space: &ParkingSpace, expected_version: Option<u64>) -> Result<PutOutcome> {
        let mut spaces = self.spaces.write().map_err(poison_err)?;
        let current = spaces.get(&space.node_id).map(|s| s.version);

        if current != expected_version {
            return Ok(PutOutcome::Conflict {
                current_version: current,
            });
        }

        spaces.insert(space.node_id.clone(), space.clone());
        Ok(PutOutcome::Written)
    }

    async fn scan(&self) -> Result<Vec<ParkingSpace>> {
        Ok(self
            .spaces
            .read()
            .map_err(poison_err)?
            .values()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionLog for MemStore {
    async fn append(&self, session: &SessionRecord) -> Result<()> {
        self.sessions.write().map_err(poison_err)?.push(session.clone());
        Ok(())
    }

    async fn sessions_since(&self, since: Option<EpochSecs>) -> Result<Vec<SessionRecord>> {
        let mut out: Vec<SessionRecord> = self
            .sessions
            .read()
            .map_err(poison_err)?
            .iter()
            .filter(|s| since.map_or(true, |t| s.end_time >= t))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.end_time);
        Ok(out)
    }
}

#[async_trait]
impl HistoryLog for MemStore {
    async fn append(&self, reading: &SensorReading) -> Result<()> {
        self.history.write().map_err(poison_err)?.push(reading.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_conditional_on_version() {
        let store = MemStore::new();
        let mut s = ParkingSpace::new_default("A1", 0);

        assert!(store.put(&s, None).await.unwrap().is_written());
        // Insert-if-absent refuses an existing record.
        assert_eq!(
            store.put(&s, None).await.unwrap(),
            PutOutcome::Conflict {
                current_version: Some(0)
            }
        );

        s.version = 1;
        assert!(store.put(&s, Some(0)).await.unwrap().is_written());
        // Stale expectation loses.
        s.version = 2;
        assert_eq!(
            store.put(&s, Some(0)).await.unwrap(),
            PutOutcome::Conflict {
                current_version: Some(1)
            }
        );
        assert_eq!(store.get("A1").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn sessions_since_filters_on_end_time() {
        let store = MemStore::new();
        SessionLog::append(&store, &SessionRecord::closed("A1", 0, 50))
            .await
            .unwrap();
        SessionLog::append(&store, &SessionRecord::closed("A2", 90, 120))
            .await
            .unwrap();

        assert_eq!(store.sessions_since(None).await.unwrap().len(), 2);
        let recent = store.sessions_since(Some(100)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].node_id, "A2");
    }
}
