//! Last-run report persistence: load, save (atomic), path derivation.

use super::types::RunReport;
use std::path::{Path, PathBuf};

/// Report file for a host within the state directory.
pub fn report_path(state_dir: &Path, host: &str) -> PathBuf {
    state_dir.join(host).join("last-run.yaml")
}

/// Load a host's last report. Returns None if no run was saved yet.
pub fn load_report(state_dir: &Path, host: &str) -> Result<Option<RunReport>, String> {
    let path = report_path(state_dir, host);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let report: RunReport = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid report {}: {}", path.display(), e))?;
    Ok(Some(report))
}

/// Save a report atomically (write to temp, then rename).
pub fn save_report(state_dir: &Path, report: &RunReport) -> Result<PathBuf, String> {
    let path = report_path(state_dir, &report.host);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let yaml =
        serde_yaml_ng::to_string(report).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        format!(
            "cannot rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    Ok(path)
}
