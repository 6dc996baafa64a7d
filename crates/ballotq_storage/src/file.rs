//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of the scratch file written during [`StorageBackend::replace`].
const REPLACE_SUFFIX: &str = "rewrite";

/// A single-file storage backend.
///
/// `sync` maps to `File::sync_all`, so a successful sync survives power loss
/// on file systems that honour fsync. `replace` writes a sibling scratch
/// file, fsyncs it, renames it over the live file and fsyncs the directory.
///
/// # Example
///
/// ```no_run
/// use ballotq_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("records.log")).unwrap();
/// backend.append(b"frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens the file at `path`, creating it empty if missing.
    ///
    /// A scratch file left behind by an interrupted `replace` is removed;
    /// the rename never happened, so the live file is authoritative.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let scratch = scratch_path(path);
        if scratch.exists() {
            debug!(path = %scratch.display(), "removing stale rewrite file");
            std::fs::remove_file(&scratch)?;
        }

        let file = open_rw(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Opens the file at `path`, creating parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the live file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: self.size,
            });
        }

        let file = self.file.get_mut();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let scratch = scratch_path(&self.path);
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&scratch)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }

        std::fs::rename(&scratch, &self.path)?;
        sync_parent_dir(&self.path)?;

        *self.file.get_mut() = open_rw(&self.path)?;
        self.size = data.len() as u64;
        debug!(path = %self.path.display(), size = self.size, "replaced file contents");
        Ok(())
    }
}

fn open_rw(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(REPLACE_SUFFIX);
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

// Directory handles cannot be fsync'd on this platform; rename is already durable.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn append_returns_offsets_and_reads_back() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("records.log")).unwrap();

        assert_eq!(backend.append(b"vote-").unwrap(), 0);
        assert_eq!(backend.append(b"one").unwrap(), 5);
        assert_eq!(backend.read_at(0, 8).unwrap(), b"vote-one");
        assert_eq!(backend.read_at(5, 3).unwrap(), b"one");
        assert!(backend.read_at(2, 0).unwrap().is_empty());
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("records.log")).unwrap();
        backend.append(b"abc").unwrap();

        assert!(matches!(
            backend.read_at(1, 5),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
    }

    #[test]
    fn synced_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"durable").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 7);
        assert_eq!(backend.read_at(0, 7).unwrap(), b"durable");
    }

    #[test]
    fn truncate_cuts_tail_and_rejects_growth() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("records.log")).unwrap();
        backend.append(b"complete|torn").unwrap();

        backend.truncate(8).unwrap();
        assert_eq!(backend.size().unwrap(), 8);
        assert_eq!(backend.append(b"next").unwrap(), 8);
        assert_eq!(backend.read_at(0, 12).unwrap(), b"completenext");

        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
    }

    #[test]
    fn replace_swaps_contents_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"old old old").unwrap();
            backend.replace(b"new").unwrap();
            assert_eq!(backend.size().unwrap(), 3);
            assert_eq!(backend.append(b"+").unwrap(), 3);
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_at(0, 4).unwrap(), b"new+");
        assert!(!scratch_path(&path).exists());
    }

    #[test]
    fn open_discards_stale_scratch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");
        std::fs::write(&path, b"live").unwrap();
        std::fs::write(scratch_path(&path), b"half-written").unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_at(0, 4).unwrap(), b"live");
        assert!(!scratch_path(&path).exists());
    }

    #[test]
    fn open_with_create_dirs_builds_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue").join("v1").join("records.log");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }
}
