pub mod data_page;
pub mod header_page;

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// Size of one page in bytes.
pub const PAGE_SIZE: usize = 8192;

/// 1-based page number. Page 1 is the header page; ordinary pages start at 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Widen into the cache's 64-bit key space.
    pub fn key(self) -> u64 {
        self.0 as u64
    }

    /// Byte offset of this page in the database file.
    pub fn offset(self) -> u64 {
        (self.0 as u64 - 1) * PAGE_SIZE as u64
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-memory handle over one fixed-size page.
///
/// The pager owns the page while it is cached; callers hold it through an
/// `Arc` obtained from `Pager::get_page` and must call `Pager::release` when
/// done. Touching the bytes after release is a caller bug and is not defended
/// against here.
pub struct Page {
    id: PageId,
    data: Mutex<Box<[u8; PAGE_SIZE]>>,
    dirty: AtomicBool,
}

impl Page {
    pub fn new(id: PageId, data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self {
            id,
            data: Mutex::new(data),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    /// Lock the page bytes for reading or writing.
    pub fn data(&self) -> MutexGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.lock()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }
}
