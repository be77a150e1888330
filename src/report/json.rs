use super::types::RunReport;
use crate::error::SinkError;
use std::path::Path;

/// Pretty-printed JSON for the report
pub fn render(report: &RunReport) -> Result<String, SinkError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write `content` to `path` through a sibling temp file so readers never
/// observe a half-written report.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), SinkError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
