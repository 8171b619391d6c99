//! Append-only JSONL journal of converge events, one file per host.

use crate::core::types::{JournalEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current UTC time as ISO 8601, second precision.
pub fn now_iso8601() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_utc(secs)
}

/// Format seconds since the Unix epoch as `YYYY-MM-DDTHH:MM:SSZ`.
fn format_utc(secs: u64) -> String {
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let tod = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60
    )
}

/// Proleptic Gregorian date for a day count relative to 1970-01-01
/// (era-based conversion, valid for any day count).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Generate a run ID from the low 48 bits of the wall clock in nanoseconds.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Journal file for a host.
pub fn event_log_path(state_dir: &Path, host: &str) -> PathBuf {
    state_dir.join(host).join("events.jsonl")
}

/// Append an event to the host's journal.
pub fn append_event(state_dir: &Path, host: &str, event: JournalEvent) -> Result<(), String> {
    let path = event_log_path(state_dir, host);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("cannot create state dir: {}", e))?;
    }

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open journal {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

/// Read back a host's journal, oldest first. A missing journal is empty.
pub fn read_events(state_dir: &Path, host: &str) -> Result<Vec<TimestampedEvent>, String> {
    let path = event_log_path(state_dir, host);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read journal {}: {}", path.display(), e))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| format!("{} line {}: {}", path.display(), n + 1, e))
        })
        .collect()
}

/// Journal sink bound to one host. Write failures are logged, never fatal
/// to a converge.
#[derive(Debug, Clone)]
pub struct Journal {
    state_dir: PathBuf,
    host: String,
}

impl Journal {
    pub fn new(state_dir: &Path, host: &str) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            host: host.to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn record(&self, event: JournalEvent) {
        if let Err(e) = append_event(&self.state_dir, &self.host, event) {
            tracing::warn!(host = %self.host, error = %e, "journal write failed");
        }
    }
}
