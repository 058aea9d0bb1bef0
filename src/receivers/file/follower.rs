// SPDX-License-Identifier: Apache-2.0

//! Line-by-line reading of the followed file.

use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::file_id::FileId;
use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

/// One line without its terminator. Bytes are passed on untouched.
pub type RawLine = Vec<u8>;

/// Source of lines for the tailing coordinator.
///
/// `next_line` must be cancel-safe: it is raced against the save trigger in a
/// `select!`, and a dropped call must not lose data.
pub trait LineFollower: Send {
    /// The next complete line, or `None` once the stream is closed.
    fn next_line(&mut self) -> impl Future<Output = Result<Option<RawLine>>> + Send;

    /// Byte position just past the last line returned.
    fn offset(&self) -> u64;

    /// Inode of the file currently being read.
    fn inode(&self) -> u64;
}

enum SourceChange {
    Unchanged,
    Reopened(File, FileId),
}

pub struct FileFollower {
    path: PathBuf,
    follow: bool,
    poll_interval: Duration,
    reader: BufReader<File>,
    file_id: FileId,
    offset: u64,
    pending: Vec<u8>,
    closed: bool,
}

impl FileFollower {
    /// Opens `path` and positions it at `start_offset`. An offset beyond the end
    /// of the file means it was truncated while nobody watched, so reading
    /// starts over from 0.
    pub async fn open(
        path: impl AsRef<Path>,
        start_offset: u64,
        follow: bool,
        poll_interval: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::FileNotFound(path)),
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;

        let offset = if start_offset > metadata.len() {
            warn!(
                path = ?path,
                start_offset,
                len = metadata.len(),
                "Saved offset is past the end of the file, starting from the beginning"
            );
            0
        } else {
            start_offset
        };
        file.seek(SeekFrom::Start(offset)).await?;

        Ok(Self {
            path,
            follow,
            poll_interval,
            reader: BufReader::new(file),
            file_id: FileId::from_metadata(&metadata),
            offset,
            pending: Vec::new(),
            closed: false,
        })
    }

    fn take_line(&mut self) -> RawLine {
        self.offset += self.pending.len() as u64;
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        line
    }

    /// Looks at what the path points to now, reopening it after rotation or truncation.
    async fn poll_source(&self) -> Result<SourceChange> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "Followed file is missing, waiting for it to reappear");
                return Ok(SourceChange::Unchanged);
            }
            Err(e) => return Err(e.into()),
        };

        let current = FileId::from_metadata(&metadata);
        let consumed = self.offset + self.pending.len() as u64;
        if current == self.file_id && metadata.len() >= consumed {
            return Ok(SourceChange::Unchanged);
        }

        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SourceChange::Unchanged),
            Err(e) => return Err(e.into()),
        };
        let reopened = FileId::from_metadata(&file.metadata().await?);

        if reopened == self.file_id {
            warn!(
                path = ?self.path,
                offset = consumed,
                len = metadata.len(),
                "File was truncated, reading from the beginning"
            );
        } else {
            info!(
                path = ?self.path,
                from = %self.file_id,
                to = %reopened,
                "File was rotated, reopening"
            );
        }
        Ok(SourceChange::Reopened(file, reopened))
    }
}

impl LineFollower for FileFollower {
    async fn next_line(&mut self) -> Result<Option<RawLine>> {
        if self.closed {
            return Ok(None);
        }

        loop {
            self.reader.read_until(b'\n', &mut self.pending).await?;
            if self.pending.last() == Some(&b'\n') {
                return Ok(Some(self.take_line()));
            }

            // end of file, possibly with a partial line pending
            if !self.follow {
                self.closed = true;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            tokio::time::sleep(self.poll_interval).await;
            let SourceChange::Reopened(file, file_id) = self.poll_source().await? else {
                continue;
            };

            let rotated = file_id != self.file_id;
            if rotated {
                // the old file may have grown between the last read and the rename
                self.reader.read_until(b'\n', &mut self.pending).await?;
                if self.pending.last() == Some(&b'\n') {
                    return Ok(Some(self.take_line()));
                }
            }

            // the tail of a rotated file ends its last line
            let tail = if rotated && !self.pending.is_empty() {
                Some(self.take_line())
            } else {
                None
            };

            self.reader = BufReader::new(file);
            self.file_id = file_id;
            self.offset = 0;
            self.pending.clear();

            if let Some(line) = tail {
                return Ok(Some(line));
            }
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn inode(&self) -> u64 {
        self.file_id.ino()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const POLL: Duration = Duration::from_millis(10);
    const WAIT: Duration = Duration::from_secs(5);

    async fn next(follower: &mut FileFollower) -> Option<RawLine> {
        timeout(WAIT, follower.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
    }

    /// Gives up on the read after a few poll intervals.
    async fn stays_idle(follower: &mut FileFollower) -> bool {
        let short = Duration::from_millis(50);
        timeout(short, follower.next_line()).await.is_err()
    }

    fn append(path: &Path, data: &[u8]) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(data).unwrap();
    }

    #[tokio::test]
    async fn one_shot_reads_to_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"first\r\nsecond\n\nlast without newline").unwrap();

        let mut follower = FileFollower::open(&path, 0, false, POLL).await.unwrap();
        assert_eq!(Some(b"first".to_vec()), next(&mut follower).await);
        assert_eq!(7, follower.offset());
        assert_eq!(Some(b"second".to_vec()), next(&mut follower).await);
        assert_eq!(14, follower.offset());
        assert_eq!(Some(Vec::new()), next(&mut follower).await);
        let last = b"last without newline".to_vec();
        assert_eq!(Some(last), next(&mut follower).await);
        assert_eq!(35, follower.offset());
        assert_eq!(None, next(&mut follower).await);
        assert_eq!(None, next(&mut follower).await);
    }

    #[tokio::test]
    async fn starts_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"skipped\nwanted\n").unwrap();

        let mut follower = FileFollower::open(&path, 8, false, POLL).await.unwrap();
        assert_eq!(Some(b"wanted".to_vec()), next(&mut follower).await);
        assert_eq!(15, follower.offset());
        assert_eq!(None, next(&mut follower).await);
    }

    #[tokio::test]
    async fn offset_past_end_restarts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"short\n").unwrap();

        let mut follower = FileFollower::open(&path, 1000, false, POLL).await.unwrap();
        assert_eq!(Some(b"short".to_vec()), next(&mut follower).await);
    }

    #[tokio::test]
    async fn missing_file() {
        let dir = TempDir::new().unwrap();
        let result = FileFollower::open(dir.path().join("nope.log"), 0, true, POLL).await;
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[tokio::test]
    async fn follows_appended_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"one\n").unwrap();

        let mut follower = FileFollower::open(&path, 0, true, POLL).await.unwrap();
        assert_eq!(Some(b"one".to_vec()), next(&mut follower).await);

        // nothing new yet
        assert!(stays_idle(&mut follower).await);

        append(&path, b"tw");
        assert!(stays_idle(&mut follower).await);
        append(&path, b"o\nthree\n");

        assert_eq!(Some(b"two".to_vec()), next(&mut follower).await);
        assert_eq!(Some(b"three".to_vec()), next(&mut follower).await);
        assert_eq!(14, follower.offset());
    }

    #[tokio::test]
    async fn reopens_after_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"old\n").unwrap();

        let mut follower = FileFollower::open(&path, 0, true, POLL).await.unwrap();
        let old_inode = follower.inode();
        assert_eq!(Some(b"old".to_vec()), next(&mut follower).await);

        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        std::fs::write(&path, b"new\n").unwrap();

        assert_eq!(Some(b"new".to_vec()), next(&mut follower).await);
        assert_ne!(old_inode, follower.inode());
        assert_eq!(4, follower.offset());
    }

    #[tokio::test]
    async fn rotated_file_is_drained_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let rotated = dir.path().join("app.log.1");
        std::fs::write(&path, b"old\n").unwrap();

        // the writes below land while the follower sleeps at end of file
        let poll = Duration::from_millis(300);
        let mut follower = FileFollower::open(&path, 0, true, poll).await.unwrap();
        assert_eq!(Some(b"old".to_vec()), next(&mut follower).await);

        let reading = tokio::spawn(async move {
            let line = follower.next_line().await.unwrap();
            (follower, line)
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::rename(&path, &rotated).unwrap();
        append(&rotated, b"late\nlater\n");
        std::fs::write(&path, b"new\n").unwrap();

        let (mut follower, line) = timeout(WAIT, reading).await.unwrap().unwrap();
        assert_eq!(Some(b"late".to_vec()), line);
        assert_eq!(Some(b"later".to_vec()), next(&mut follower).await);
        assert_eq!(Some(b"new".to_vec()), next(&mut follower).await);
        assert_eq!(4, follower.offset());
    }

    #[tokio::test]
    async fn restarts_after_truncation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"a fairly long first line\n").unwrap();

        let mut follower = FileFollower::open(&path, 0, true, POLL).await.unwrap();
        let inode = follower.inode();
        let first = b"a fairly long first line".to_vec();
        assert_eq!(Some(first), next(&mut follower).await);

        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        append(&path, b"x\n");

        assert_eq!(Some(b"x".to_vec()), next(&mut follower).await);
        assert_eq!(inode, follower.inode());
        assert_eq!(2, follower.offset());
    }

    #[tokio::test]
    async fn cancelled_read_keeps_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"partial").unwrap();

        let mut follower = FileFollower::open(&path, 0, true, POLL).await.unwrap();
        assert!(stays_idle(&mut follower).await);

        append(&path, b" line\n");
        assert_eq!(Some(b"partial line".to_vec()), next(&mut follower).await);
        assert_eq!(13, follower.offset());
    }
}
