//! Storage layer implementation for pagedb.
//!
//! This module turns a single flat file into fixed-size pages and serves them
//! to upper layers through a bounded, reference-counted cache. Key components:
//!
//! - **Page**: Fixed-size (8KB) blocks of data, the basic unit of I/O
//! - **ResourceCache**: Generic reference-counted cache with injected
//!   load/evict hooks
//! - **Pager**: In-memory page cache over the database file
//! - **Wal**: Checksummed write-ahead log with bad-tail truncation on open
//! - **FreeSpaceIndex**: Buckets pages by available space for allocation
//!
//! Callers append a log record before mutating a page, fetch pages through
//! the pager, and pick a target page for new data through the free-space
//! index. Durability of page bytes is the pager's responsibility; durability
//! of log records is the WAL's.

pub mod cache;
pub mod disk;
pub mod error;
pub mod free_space;
pub mod page;
pub mod pager;
pub mod wal;

pub use cache::ResourceCache;
pub use disk::DbFile;
pub use error::{StorageError, StorageResult};
pub use free_space::{FreeSpaceIndex, PageSpace};
pub use page::{Page, PageId, PAGE_SIZE};
pub use pager::Pager;
pub use wal::Wal;
