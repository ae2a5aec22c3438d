use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn workflow_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/pdpflow.log")
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Appends one JSON line to the shared log. Logging never fails the caller.
pub fn append_workflow_log(state_root: &Path, level: &str, event: &str, message: &str) {
    let payload = serde_json::json!({
        "timestamp": now_rfc3339(),
        "level": level,
        "event": event,
        "message": message,
    });

    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };
    let _ = append_line(&workflow_log_path(state_root), &line);
}

pub fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn log_lines_are_json_with_level_and_event() {
        let dir = tempdir().expect("tempdir");
        append_workflow_log(dir.path(), "info", "workflow.start", "file=a.jpg");
        append_workflow_log(dir.path(), "warn", "workflow.poll", "pending");

        let raw = fs::read_to_string(workflow_log_path(dir.path())).expect("read log");
        let lines: Vec<Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "workflow.start");
        assert_eq!(lines[1]["level"], "warn");
        assert!(lines[0]["timestamp"].as_str().expect("ts").ends_with('Z'));
    }
}
