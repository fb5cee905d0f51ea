//! `spk sessions export`: completed sessions as CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use spk_schemas::{SessionRecord, SessionRow};

/// Write rows newest first, one header line.
pub fn write_sessions_csv<W: Write>(out: W, sessions: &[SessionRecord]) -> Result<usize> {
    let mut sorted: Vec<&SessionRecord> = sessions.iter().collect();
    sorted.sort_by(|a, b| b.end_time.cmp(&a.end_time));

    let mut w = csv::Writer::from_writer(out);
    for s in &sorted {
        w.serialize(SessionRow::from(*s))
            .context("csv serialize failed")?;
    }
    w.flush().context("csv flush failed")?;
    Ok(sorted.len())
}

pub fn export_to_path(path: &Path, sessions: &[SessionRecord]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create_dir_all {:?}", parent))?;
        }
    }
    let f = File::create(path).with_context(|| format!("create {:?}", path))?;
    write_sessions_csv(f, sessions)
}
