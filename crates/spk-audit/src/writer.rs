use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::Value;

use crate::chain::replay;
use crate::event::{canonical_json, compute_event_hash, derive_event_id, AuditEvent};

/// Appends events to a JSONL file. The file is opened per append, so a
/// writer can be built before the path is writable.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
}

impl AuditWriter {
    /// Start a fresh log at `path`, creating parent directories.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
                .with_context(|| format!("create audit dir {}", dir.display()))?,
            _ => {}
        }
        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Continue an existing log after a restart. A missing file starts a
    /// fresh one; a log whose chain is already broken is refused.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, hash_chain)?;
        if !w.path.exists() {
            return Ok(w);
        }

        let content = fs::read_to_string(&w.path)
            .with_context(|| format!("read audit log {}", w.path.display()))?;
        let (tail, broken) = replay(&content)?;
        if let Some((line, reason)) = broken {
            bail!(
                "audit log {} is broken at line {line} ({reason}); refusing to extend it",
                w.path.display()
            );
        }
        w.seq = tail.events;
        w.last_hash = tail.last_hash;
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Events in the log, resumed ones included.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn append(
        &mut self,
        node_id: &str,
        topic: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEvent> {
        let hash_prev = if self.hash_chain {
            self.last_hash.clone()
        } else {
            None
        };
        let mut ev = AuditEvent {
            event_id: derive_event_id(self.last_hash.as_deref(), self.seq, &payload)?,
            seq: self.seq,
            node_id: node_id.to_string(),
            recorded_at: Utc::now(),
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev,
            hash_self: None,
        };
        if self.hash_chain {
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let mut line = canonical_json(&ev)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .with_context(|| format!("append to audit log {}", self.path.display()))?;

        // Only advance once the line is on disk; a failed append can be retried.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}
