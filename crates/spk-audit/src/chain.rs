use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::event::{compute_event_hash, AuditEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// `line` is 1-based and counts blank lines.
    Broken { line: usize, reason: String },
}

/// Tail of a chain after replaying it.
#[derive(Debug, Default)]
pub(crate) struct ChainTail {
    pub events: u64,
    pub last_hash: Option<String>,
}

/// Walk every event, checking each link. Stops at the first bad one.
pub(crate) fn replay(content: &str) -> Result<(ChainTail, Option<(usize, String)>)> {
    let mut tail = ChainTail::default();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lineno = idx + 1;
        let ev: AuditEvent = serde_json::from_str(line)
            .with_context(|| format!("audit line {lineno} is not an event"))?;

        if ev.hash_prev != tail.last_hash {
            let reason = format!(
                "hash_prev mismatch: expected {:?}, got {:?}",
                tail.last_hash, ev.hash_prev
            );
            return Ok((tail, Some((lineno, reason))));
        }
        if let Some(claimed) = &ev.hash_self {
            let actual = compute_event_hash(&ev)?;
            if *claimed != actual {
                let reason = format!("hash_self mismatch: claimed {claimed}, recomputed {actual}");
                return Ok((tail, Some((lineno, reason))));
            }
        }

        tail.events += 1;
        tail.last_hash = ev.hash_self;
    }

    Ok((tail, None))
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("read audit log {}", path.display()))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    Ok(match replay(content)? {
        (tail, None) => VerifyResult::Valid {
            lines: tail.events as usize,
        },
        (_, Some((line, reason))) => VerifyResult::Broken { line, reason },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_is_valid() {
        assert_eq!(
            verify_hash_chain_str("\n\n").unwrap(),
            VerifyResult::Valid { lines: 0 }
        );
    }

    #[test]
    fn garbage_line_is_an_error() {
        let err = verify_hash_chain_str("{not json}\n").unwrap_err();
        assert!(format!("{err:#}").contains("audit line 1"));
    }
}
