// SPDX-License-Identifier: Apache-2.0

//! Configuration for the file receiver.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FILE: &str = "/var/log/syslog";

/// Configuration for the file receiver
#[derive(Debug, Clone)]
pub struct FileReceiverConfig {
    /// File to read
    pub path: PathBuf,
    /// Keep waiting for appended lines and resume from the saved position.
    /// When false the file is read once from the start.
    pub follow: bool,
    /// Where the position record is kept
    pub state_path: PathBuf,
    /// Interval between periodic position saves
    pub save_interval: Duration,
    /// How long to sleep at end of file before checking for new data
    pub poll_interval: Duration,
}

impl Default for FileReceiverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FILE)
    }
}

impl FileReceiverConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            state_path: default_state_path(&path),
            path,
            follow: true,
            save_interval: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Position records are only read and written while following.
    pub fn resume_enabled(&self) -> bool {
        self.follow
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("A file to follow must be specified".to_string());
        }
        if self.state_path == self.path {
            return Err("The state file must differ from the followed file".to_string());
        }
        if self.save_interval.is_zero() {
            return Err("Save interval must be greater than zero".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("Poll interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// `<file>.state`, next to the followed file.
pub fn default_state_path(path: &Path) -> PathBuf {
    let mut state: OsString = path.as_os_str().to_owned();
    state.push(".state");
    PathBuf::from(state)
}
