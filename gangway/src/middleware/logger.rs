//! JSON-lines request logging to a file, with size-based rotation.

use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Rotate once the log file exceeds this size.
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// One logged request.
#[derive(Debug, Serialize)]
pub struct RequestLogEntry {
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub ip: String,
    pub user_agent: Option<String>,
}

/// Append-only request log. Rotation renames the file with a millisecond
/// suffix and reopens a fresh one.
pub struct RequestLog {
    path: PathBuf,
    max_size: u64,
    file: Mutex<File>,
}

impl RequestLog {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self {
            path,
            max_size: DEFAULT_MAX_SIZE,
            file: Mutex::new(file),
        })
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Write one entry; failures are logged and swallowed so a full disk
    /// never takes the server down.
    pub fn write(&self, entry: &RequestLogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize request log entry: {e}");
                return;
            }
        };

        let mut file = self.file.lock().unwrap();
        if let Err(e) = writeln!(file, "{line}") {
            warn!("failed to write request log: {e}");
            return;
        }

        if let Err(e) = self.rotate_if_needed(&mut file) {
            warn!("failed to rotate request log: {e}");
        }
    }

    fn rotate_if_needed(&self, file: &mut File) -> io::Result<()> {
        if file.metadata()?.len() <= self.max_size {
            return Ok(());
        }
        let backup = self
            .path
            .with_file_name(format!(
                "{}.{}",
                self.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                Utc::now().timestamp_millis()
            ));
        debug!("rotating request log to {}", backup.display());
        std::fs::rename(&self.path, &backup)?;
        *file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        Ok(())
    }
}
