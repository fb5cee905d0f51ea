//! Read model over the session log.
//!
//! Filtering is on `end_time`; range boundaries are local midnights in the
//! configured timezone.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, Days, LocalResult, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use spk_schemas::{EpochSecs, NodeUsage, SessionRecord, SessionRow, UnknownVariant, UsageSummary};

pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyticsRange {
    /// Since local midnight.
    Today,
    /// Since Monday 00:00 local.
    Week,
    #[default]
    All,
}

impl AnalyticsRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsRange::Today => "today",
            AnalyticsRange::Week => "week",
            AnalyticsRange::All => "all",
        }
    }

    /// Lower bound (inclusive) on `end_time`, `None` for all.
    pub fn since(&self, now: EpochSecs, tz: Tz) -> Option<EpochSecs> {
        let today = tz.timestamp_opt(now, 0).single()?.date_naive();
        match self {
            AnalyticsRange::All => None,
            AnalyticsRange::Today => Some(local_midnight(today, tz)),
            AnalyticsRange::Week => {
                let back = u64::from(today.weekday().num_days_from_monday());
                let monday = today.checked_sub_days(Days::new(back))?;
                Some(local_midnight(monday, tz))
            }
        }
    }
}

impl FromStr for AnalyticsRange {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(AnalyticsRange::Today),
            "week" => Ok(AnalyticsRange::Week),
            "all" | "" => Ok(AnalyticsRange::All),
            _ => Err(UnknownVariant {
                kind: "range",
                value: s.to_string(),
            }),
        }
    }
}

/// Start of `date` in `tz`. A midnight skipped by a DST jump falls back to
/// the earliest instant of that date that exists.
fn local_midnight(date: NaiveDate, tz: Tz) -> EpochSecs {
    let naive = date.and_time(NaiveTime::default());
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.timestamp(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
        LocalResult::None => {
            let utc_guess = naive.and_utc().timestamp();
            (0..=2 * 3_600)
                .step_by(900)
                .find_map(|offset| {
                    tz.timestamp_opt(utc_guess + offset, 0)
                        .single()
                        .filter(|dt| dt.date_naive() == date)
                        .map(|dt| dt.timestamp())
                })
                .unwrap_or(utc_guess)
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn average(total: i64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round1(total as f64 / count as f64)
}

/// Per-node totals, ordered by `node_id`.
pub fn usage_by_node(sessions: &[SessionRecord]) -> Vec<NodeUsage> {
    let mut acc: BTreeMap<&str, (u64, i64)> = BTreeMap::new();
    for s in sessions {
        let e = acc.entry(s.node_id.as_str()).or_default();
        e.0 += 1;
        e.1 += s.duration_seconds;
    }

    acc.into_iter()
        .map(|(node_id, (count, total))| NodeUsage {
            node_id: node_id.to_string(),
            total_sessions: count,
            total_time_seconds: total,
            average_time_seconds: average(total, count),
        })
        .collect()
}

pub fn usage_summary(sessions: &[SessionRecord]) -> UsageSummary {
    let total_sessions = sessions.len() as u64;
    let total_time_seconds: i64 = sessions.iter().map(|s| s.duration_seconds).sum();
    UsageSummary {
        total_sessions,
        total_time_seconds,
        average_time_seconds: average(total_time_seconds, total_sessions),
    }
}

/// Newest first by `end_time`, at most `limit` rows.
pub fn recent_sessions(sessions: &[SessionRecord], limit: usize) -> Vec<SessionRow> {
    let mut sorted: Vec<&SessionRecord> = sessions.iter().collect();
    sorted.sort_by(|a, b| b.end_time.cmp(&a.end_time));
    sorted.into_iter().take(limit).map(SessionRow::from).collect()
}
