// SPDX-License-Identifier: Apache-2.0

//! Persisted read position.
//!
//! The record is a single line, `Offset <i64> Time <i64> Inode <u64>`, written
//! atomically next to the followed file. Anything that does not have exactly
//! that shape is treated as if no record existed.

use crate::receivers::file::error::{Error, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRecord {
    /// Byte offset just past the last line read
    pub offset: i64,
    /// Unix seconds when the record was captured
    pub captured_at: i64,
    /// Inode of the file the offset belongs to
    pub inode: u64,
}

impl PositionRecord {
    /// Record stamped with the current time.
    pub fn capture(inode: u64, offset: u64) -> Result<Self> {
        let offset = i64::try_from(offset)
            .map_err(|_| Error::InvalidRecord(format!("offset {} does not fit", offset)))?;
        Ok(Self {
            offset,
            captured_at: chrono::Utc::now().timestamp(),
            inode,
        })
    }
}

impl fmt::Display for PositionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Offset {} Time {} Inode {}",
            self.offset, self.captured_at, self.inode
        )
    }
}

impl FromStr for PositionRecord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let line = s.strip_suffix('\n').unwrap_or(s);
        let fields: Vec<&str> = line.split(' ').collect();

        let ["Offset", offset, "Time", captured_at, "Inode", inode] = fields.as_slice() else {
            return Err(Error::InvalidRecord(format!("unexpected shape: {:?}", s)));
        };

        let invalid =
            |what: &str, value: &str| Error::InvalidRecord(format!("bad {}: {:?}", what, value));
        let offset: i64 = offset.parse().map_err(|_| invalid("offset", offset))?;
        if offset < 0 {
            return Err(invalid("offset", &offset.to_string()));
        }

        Ok(Self {
            offset,
            captured_at: captured_at
                .parse()
                .map_err(|_| invalid("time", captured_at))?,
            inode: inode.parse().map_err(|_| invalid("inode", inode))?,
        })
    }
}

/// Reads and writes the position record. The tailing coordinator is its only user.
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when no record has been written yet.
    pub fn read(&self) -> Result<Option<PositionRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.parse().map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Offset to resume from for the file with `inode`. Every failure resets to 0.
    pub fn load(&self, inode: u64) -> u64 {
        match self.read() {
            Ok(Some(record)) if record.inode == inode => {
                info!(
                    state_file = ?self.path,
                    offset = record.offset,
                    inode,
                    "Resuming from saved position"
                );
                record.offset as u64
            }
            Ok(Some(record)) => {
                info!(
                    state_file = ?self.path,
                    saved_inode = record.inode,
                    inode,
                    "Saved position belongs to another file, starting from the beginning"
                );
                0
            }
            Ok(None) => {
                info!(state_file = ?self.path, "No saved position, starting from the beginning");
                0
            }
            Err(e) => {
                warn!(
                    state_file = ?self.path,
                    error = %e,
                    "Unusable saved position, starting from the beginning"
                );
                0
            }
        }
    }

    pub fn save(&self, inode: u64, offset: u64) -> Result<PositionRecord> {
        let record = PositionRecord::capture(inode, offset)?;
        atomic_write(&self.path, &record)?;
        debug!(state_file = ?self.path, offset, inode, "Saved position");
        Ok(record)
    }
}

fn atomic_write(path: &Path, record: &PositionRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create parent directory: {}", e))
            })?;
        }
    }

    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    if let Err(e) = write_and_rename(&temp_path, path, record) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

fn write_and_rename(temp_path: &Path, path: &Path, record: &PositionRecord) -> Result<()> {
    let file = File::create(temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", record)
        .and_then(|_| writer.flush())
        .map_err(|e| Error::Persistence(format!("failed to write position: {}", e)))?;
    drop(writer);

    fs::rename(temp_path, path)
        .map_err(|e| Error::Persistence(format!("failed to rename position file: {}", e)))
}
