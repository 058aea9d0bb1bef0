// SPDX-License-Identifier: Apache-2.0

//! File identity based on device and inode.
//!
//! A rename keeps the identity, so a changed identity behind the same path
//! means the file was rotated.

use std::fs::Metadata;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Resolves the path without opening it. Symlinks are followed.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::from_metadata(&std::fs::metadata(path)?))
    }

    /// The inode number, which is what the position record stores.
    pub fn ino(&self) -> u64 {
        self.ino
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn handle_and_path_agree() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"line\n").unwrap();

        let by_path = FileId::from_path(file.path()).unwrap();
        let by_handle = FileId::from_metadata(&file.as_file().metadata().unwrap());

        assert_eq!(by_path, by_handle);
        assert!(by_path.ino() > 0);
    }

    #[test]
    fn different_files_differ() {
        let file1 = NamedTempFile::new().unwrap();
        let file2 = NamedTempFile::new().unwrap();

        assert_ne!(
            FileId::from_path(file1.path()).unwrap(),
            FileId::from_path(file2.path()).unwrap()
        );
    }

    #[test]
    fn survives_append_and_rename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, b"first\n").unwrap();
        let before = FileId::from_path(&path).unwrap();

        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        f.write_all(b"second\n").unwrap();
        assert_eq!(before, FileId::from_path(&path).unwrap());

        let rotated = dir.path().join("access.log.1");
        std::fs::rename(&path, &rotated).unwrap();
        assert_eq!(before, FileId::from_path(&rotated).unwrap());

        std::fs::write(&path, b"fresh\n").unwrap();
        assert_ne!(before, FileId::from_path(&path).unwrap());
    }

    #[test]
    fn missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(FileId::from_path(dir.path().join("nope")).is_err());
    }

    #[test]
    fn display() {
        let file = NamedTempFile::new().unwrap();
        let metadata = file.as_file().metadata().unwrap();
        let id = FileId::from_metadata(&metadata);

        let expected = format!("{}:{}", metadata.dev(), metadata.ino());
        assert_eq!(expected, id.to_string());
    }
}
