use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const COMMAND_LOG_FILE: &str = "commands.log";

/// Append-only JSON-lines log shared by the command layer and the services.
#[derive(Debug)]
pub struct CommandLog {
    path: Option<PathBuf>,
    guard: Mutex<()>,
}

impl CommandLog {
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            path: Some(logs_dir.as_ref().join(COMMAND_LOG_FILE)),
            guard: Mutex::new(()),
        }
    }

    /// A log that drops every record.
    pub fn disabled() -> Self {
        Self {
            path: None,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, command: &str, message: &str) {
        self.append("info", command, message);
    }

    pub fn error(&self, command: &str, message: &str) {
        self.append("error", command, message);
    }

    fn append(&self, level: &str, command: &str, message: &str) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = std::env::temp_dir().join(format!("autotag-log-tests-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create log dir");
        let log = CommandLog::new(&dir);

        log.info("scan", "first");
        log.error("scan", "second");

        let raw = fs::read_to_string(dir.join(COMMAND_LOG_FILE)).expect("read log");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("valid json line");
        assert_eq!(second["level"], "error");
        assert_eq!(second["command"], "scan");
        assert_eq!(second["message"], "second");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = CommandLog::disabled();
        log.info("scan", "ignored");
        assert!(log.path().is_none());
    }
}
