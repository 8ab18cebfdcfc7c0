use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn service_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/service.log")
}

pub fn append_service_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    let path = service_log_path(state_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{} {line}", Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_lines_append_under_the_state_root() {
        let dir = tempdir().expect("tempdir");
        append_service_log_line(dir.path(), "event=start").expect("first line");
        append_service_log_line(dir.path(), "event=stop").expect("second line");

        let raw = fs::read_to_string(service_log_path(dir.path())).expect("read log");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("event=start"));
        assert!(lines[1].ends_with("event=stop"));
    }
}
