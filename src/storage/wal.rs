//! Checksummed write-ahead log.
//!
//! File format (all integers big-endian):
//!
//! ```text
//! offset 0  : u32 running checksum over every verified record
//! offset 4..: records, each [size: u32][checksum: u32][data: size bytes]
//! ```
//!
//! The per-record checksum folds the payload; the file-level checksum folds
//! whole records (header plus payload) left to right. A crash mid-append may
//! leave a partial trailing record; `open` verifies the chain, fails with
//! `BadLog` if the running checksum does not match the stored one, and
//! truncates any bad tail before handing the log back.
//!
//! Callers append a record before mutating the page it describes; the log
//! serializes appends internally but gives no atomicity across multiple
//! `append` calls.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::error::{StorageError, StorageResult};

/// Multiplier of the fold checksum: `acc = acc * SEED + byte`.
const SEED: u32 = 13331;

/// Bytes of the file-level checksum header.
const HEADER_LEN: u64 = 4;

/// Bytes of a record header (size + checksum).
const RECORD_HDR_LEN: u64 = 8;

fn fold(seed: u32, bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(seed, |acc, &b| acc.wrapping_mul(SEED).wrapping_add(b as u32))
}

struct WalInner {
    file: File,
    /// Read cursor for `next`, always at a record boundary.
    position: u64,
    file_size: u64,
    xchecksum: u32,
}

pub struct Wal {
    inner: Mutex<WalInner>,
}

impl Wal {
    /// Create a new empty log. Fails with `FileExists` if one is present.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::FileExists(path.to_path_buf()),
                ErrorKind::PermissionDenied => StorageError::FileNotWritable(path.to_path_buf()),
                _ => StorageError::Io(e),
            })?;

        file.write_u32::<BigEndian>(0)?;
        file.sync_all()?;

        Ok(Self {
            inner: Mutex::new(WalInner {
                file,
                position: HEADER_LEN,
                file_size: HEADER_LEN,
                xchecksum: 0,
            }),
        })
    }

    /// Open an existing log, verify the whole checksum chain and truncate
    /// any bad tail left by a crash.
    ///
    /// Returns the unrecoverable `BadLog` when the file is shorter than its
    /// checksum header or the chain does not match the stored checksum.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StorageError::FileNotFound(path.to_path_buf()),
                ErrorKind::PermissionDenied => StorageError::FileNotWritable(path.to_path_buf()),
                _ => StorageError::Io(e),
            })?;

        let file_size = file.metadata()?.len();
        if file_size < HEADER_LEN {
            return Err(StorageError::BadLog {
                reason: format!("file is {} bytes, shorter than the checksum header", file_size),
            });
        }

        file.seek(SeekFrom::Start(0))?;
        let stored = file.read_u32::<BigEndian>()?;

        let mut inner = WalInner {
            file,
            position: HEADER_LEN,
            file_size,
            xchecksum: stored,
        };
        Self::verify_and_trim(&mut inner)?;

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Scan every record, recompute the running checksum and cut the file at
    /// the last fully verified record.
    fn verify_and_trim(inner: &mut WalInner) -> StorageResult<()> {
        inner.position = HEADER_LEN;

        let mut running = 0u32;
        while let Some(record) = Self::read_record(inner)? {
            running = fold(running, &record);
        }
        if running != inner.xchecksum {
            return Err(StorageError::BadLog {
                reason: format!(
                    "checksum chain mismatch: stored {:#010x}, recomputed {:#010x}",
                    inner.xchecksum, running
                ),
            });
        }

        // `position` now sits just past the last verified record; anything
        // beyond it is a bad tail.
        if inner.position < inner.file_size {
            warn!(
                "discarding {} bytes of bad log tail",
                inner.file_size - inner.position
            );
            inner.file.set_len(inner.position)?;
            inner.file.sync_all()?;
            inner.file_size = inner.position;
        }
        inner.position = HEADER_LEN;
        Ok(())
    }

    /// Read the whole record (header + payload) at the cursor, or `None` at
    /// end of log or on a record that fails verification.
    fn read_record(inner: &mut WalInner) -> StorageResult<Option<Vec<u8>>> {
        if inner.position + RECORD_HDR_LEN > inner.file_size {
            return Ok(None);
        }
        inner.file.seek(SeekFrom::Start(inner.position))?;
        let size = inner.file.read_u32::<BigEndian>()? as u64;
        if inner.position + RECORD_HDR_LEN + size > inner.file_size {
            return Ok(None);
        }
        let checksum = inner.file.read_u32::<BigEndian>()?;

        let mut record = vec![0u8; (RECORD_HDR_LEN + size) as usize];
        inner.file.seek(SeekFrom::Start(inner.position))?;
        inner.file.read_exact(&mut record)?;

        if fold(0, &record[RECORD_HDR_LEN as usize..]) != checksum {
            return Ok(None);
        }
        inner.position += record.len() as u64;
        Ok(Some(record))
    }

    /// Record headers carry the payload length as a u32; anything larger
    /// cannot be framed.
    fn payload_size(len: usize) -> StorageResult<u32> {
        u32::try_from(len).map_err(|_| StorageError::DataTooLarge {
            len,
            available: u32::MAX as usize,
        })
    }

    /// Append one record and persist the updated file-level checksum.
    pub fn append(&self, data: &[u8]) -> StorageResult<()> {
        let size = Self::payload_size(data.len())?;
        let mut record = Vec::with_capacity(RECORD_HDR_LEN as usize + data.len());
        record.write_u32::<BigEndian>(size)?;
        record.write_u32::<BigEndian>(fold(0, data))?;
        record.extend_from_slice(data);

        let mut inner = self.inner.lock();
        inner.file.seek(SeekFrom::End(0))?;
        inner.file.write_all(&record)?;
        inner.file_size += record.len() as u64;

        inner.xchecksum = fold(inner.xchecksum, &record);
        let xchecksum = inner.xchecksum;
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.write_u32::<BigEndian>(xchecksum)?;
        inner.file.sync_all()?;

        debug!("appended {} byte log record", data.len());
        Ok(())
    }

    /// Next record payload in log order, or `None` when the log is
    /// exhausted (or the remaining bytes fail verification).
    pub fn next(&self) -> StorageResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        Ok(Self::read_record(&mut inner)?
            .map(|record| record[RECORD_HDR_LEN as usize..].to_vec()))
    }

    /// Reset the read cursor for a fresh replay pass.
    pub fn rewind(&self) {
        self.inner.lock().position = HEADER_LEN;
    }

    /// Hard-truncate the backing file to `len` bytes. Used by recovery to
    /// drop uncommitted tail entries; the caller is responsible for picking
    /// a record boundary.
    pub fn truncate(&self, len: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.file.set_len(len)?;
        inner.file.sync_all()?;
        inner.file_size = len;
        if inner.position > len {
            inner.position = HEADER_LEN;
        }
        Ok(())
    }

    /// Byte length of the log file, including the checksum header.
    pub fn len(&self) -> u64 {
        self.inner.lock().file_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= HEADER_LEN
    }

    pub fn close(&self) -> StorageResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}
