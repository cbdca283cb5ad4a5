//! Positioned file I/O over the single database file.
//!
//! `DbFile` knows nothing about caching or page contents; it reads and writes
//! whole pages at computed offsets. The pager serializes access to it with a
//! file lock that is distinct from its cache bookkeeping lock.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::error::{StorageError, StorageResult};
use super::page::{PageId, PAGE_SIZE};

pub struct DbFile {
    file: File,
}

impl DbFile {
    /// Create a new database file. Fails with `FileExists` if one is already
    /// present at `path`.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::FileExists(path.to_path_buf()),
                ErrorKind::PermissionDenied => StorageError::FileNotWritable(path.to_path_buf()),
                _ => StorageError::Io(e),
            })?;

        Ok(Self { file })
    }

    /// Open an existing database file for reading and writing.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StorageError::FileNotFound(path.to_path_buf()),
                ErrorKind::PermissionDenied => StorageError::FileNotWritable(path.to_path_buf()),
                _ => StorageError::Io(e),
            })?;

        Ok(Self { file })
    }

    /// Read exactly one page into a fresh buffer.
    pub fn read_page(&mut self, id: PageId) -> StorageResult<Box<[u8; PAGE_SIZE]>> {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        self.file.seek(SeekFrom::Start(id.offset()))?;
        self.file.read_exact(buf.as_mut_slice())?;
        Ok(buf)
    }

    /// Write one page at its offset and force it durable.
    pub fn write_page(&mut self, id: PageId, data: &[u8; PAGE_SIZE]) -> StorageResult<()> {
        self.file.seek(SeekFrom::Start(id.offset()))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Number of whole pages currently held by the file.
    pub fn page_count(&self) -> StorageResult<u32> {
        let len = self.file.metadata()?.len();
        Ok((len / PAGE_SIZE as u64) as u32)
    }

    /// Shrink (or grow) the file to hold exactly `pages` pages.
    pub fn truncate_pages(&mut self, pages: u32) -> StorageResult<()> {
        self.file.set_len(pages as u64 * PAGE_SIZE as u64)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
