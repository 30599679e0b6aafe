//! Pluggable capture-time lookup for downloaded files.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::site::utils::unix_time;

/// Reports the capture time embedded in an image file, if any.
pub trait MetadataHook: Send + Sync + fmt::Debug {
    /// Capture time of the file at `path`.
    fn capture_time(&self, path: &Path) -> Option<SystemTime>;
}

/// Hook that never reports a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataHook for NoMetadata {
    fn capture_time(&self, _path: &Path) -> Option<SystemTime> {
        None
    }
}

/// Reads `DateTimeOriginal` through the external `exiftool` binary.
#[derive(Debug, Clone)]
pub struct ExiftoolHook {
    program: String,
}

impl Default for ExiftoolHook {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExiftoolHook {
    /// Uses `program` as the exiftool executable.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MetadataHook for ExiftoolHook {
    fn capture_time(&self, path: &Path) -> Option<SystemTime> {
        let output = match Command::new(&self.program)
            .args(["-s3", "-d", "%s", "-DateTimeOriginal"])
            .arg(path)
            .output()
        {
            Ok(output) => output,
            Err(error) => {
                warn!(program = %self.program, error = %error, "cannot run metadata tool");
                return None;
            }
        };
        if !output.status.success() {
            debug!(path = %path.display(), status = ?output.status.code(), "metadata tool reported failure");
            return None;
        }
        parse_epoch_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses the first line of `exiftool -d %s` output as Unix seconds.
fn parse_epoch_output(stdout: &str) -> Option<SystemTime> {
    stdout
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<i64>().ok())
        .and_then(unix_time)
}
