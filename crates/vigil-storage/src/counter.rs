// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw reads of SQLite's file change counter.
//!
//! The counter is read straight from the file header through a plain read-only
//! descriptor. Going through the engine would run a statement, which would in
//! turn fire the update hook and disturb the very accounting it feeds.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;
use vigil_core::VigilError;

/// Byte offset of the 4-byte big-endian "file change counter" in the header.
///
/// Taken from the SQLite database file format (section 1.3.8 of
/// <https://www.sqlite.org/fileformat2.html>), stable since format 3. The
/// counter only moves in rollback-journal modes, which is why the gateway
/// forces `journal_mode = DELETE`.
pub const COUNTER_OFFSET: u64 = 24;

/// Magic string every SQLite 3 database file starts with.
pub const HEADER_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Reader for the change counter of one database file.
#[derive(Debug)]
pub struct ChangeCounter {
    path: PathBuf,
    file: Option<File>,
}

impl ChangeCounter {
    /// Open a read-only descriptor on `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// A reader without a descriptor. Every read yields 0.
    pub fn inactive(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    /// Current counter value, or 0 when there is nothing to read.
    ///
    /// A file shorter than the header (freshly created, nothing committed yet)
    /// also reads as 0.
    pub fn read(&mut self) -> u32 {
        let Some(file) = self.file.as_mut() else {
            return 0;
        };
        match read_at_offset(file) {
            Ok(value) => value,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "change counter unreadable, treating as 0");
                0
            }
        }
    }

    /// Check that the file is either empty or a SQLite 3 database.
    pub fn verify_header(&mut self) -> Result<(), VigilError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let len = file
            .metadata()
            .map_err(|e| VigilError::Monitor {
                source: Box::new(e),
            })?
            .len();
        if len == 0 {
            return Ok(());
        }

        let mut magic = [0u8; 16];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut magic))
            .map_err(|_| {
                VigilError::UnsupportedFormat(format!(
                    "{} is too short to hold a SQLite header",
                    self.path.display()
                ))
            })?;
        if &magic != HEADER_MAGIC {
            return Err(VigilError::UnsupportedFormat(format!(
                "{} is not a SQLite 3 database",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// One-shot read of the change counter at `path`.
pub fn read_change_counter(path: &Path) -> io::Result<u32> {
    let mut file = File::open(path)?;
    read_at_offset(&mut file)
}

fn read_at_offset(file: &mut File) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    file.seek(SeekFrom::Start(COUNTER_OFFSET))?;
    file.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn header_with_counter(counter: u32) -> Vec<u8> {
        let mut header = vec![0u8; 100];
        header[..16].copy_from_slice(HEADER_MAGIC);
        header[24..28].copy_from_slice(&counter.to_be_bytes());
        header
    }

    #[test]
    fn reads_big_endian_counter_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header.db");
        std::fs::write(&path, header_with_counter(0x0102_0304)).unwrap();

        let mut counter = ChangeCounter::open(&path).unwrap();
        assert!(counter.is_active());
        assert_eq!(counter.read(), 0x0102_0304);
        assert_eq!(read_change_counter(&path).unwrap(), 0x0102_0304);
    }

    #[test]
    fn sees_updates_through_the_same_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moving.db");
        std::fs::write(&path, header_with_counter(7)).unwrap();
        let mut counter = ChangeCounter::open(&path).unwrap();
        assert_eq!(counter.read(), 7);

        std::fs::write(&path, header_with_counter(8)).unwrap();
        assert_eq!(counter.read(), 8);
    }

    #[test]
    fn inactive_reader_returns_zero() {
        let mut counter = ChangeCounter::inactive(Path::new("/nonexistent/vigil.db"));
        assert!(!counter.is_active());
        assert_eq!(counter.read(), 0);
        assert!(counter.verify_header().is_ok());
    }

    #[test]
    fn short_file_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.db");
        let mut f = File::create(&path).unwrap();
        f.write_all(&[1, 2, 3]).unwrap();

        let mut counter = ChangeCounter::open(&path).unwrap();
        assert_eq!(counter.read(), 0);
    }

    #[test]
    fn empty_file_passes_header_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        File::create(&path).unwrap();

        let mut counter = ChangeCounter::open(&path).unwrap();
        assert!(counter.verify_header().is_ok());
    }

    #[test]
    fn foreign_file_fails_header_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"this is not a database, just some text").unwrap();

        let mut counter = ChangeCounter::open(&path).unwrap();
        let err = counter.verify_header().unwrap_err();
        assert!(matches!(err, VigilError::UnsupportedFormat(_)), "got: {err}");
    }
}
