//! Free-space index over ordinary pages.
//!
//! Pages are bucketed by how much free space they have left, in 40 intervals
//! of `PAGE_SIZE / 40` bytes, so an allocator can find a page with enough
//! room without touching page bytes. `select` removes the entry it returns;
//! the page stays invisible to other allocators until the caller re-`add`s it
//! after writing, so two allocators never fill the same free region.
//!
//! This index holds only bookkeeping tuples and is maintained independently
//! of the pager's eviction state.

use parking_lot::Mutex;

use super::page::{PageId, PAGE_SIZE};

pub const BUCKET_COUNT: usize = 40;
pub const BUCKET_WIDTH: usize = PAGE_SIZE / BUCKET_COUNT;

/// One index entry: a page and how much free space it had when added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpace {
    pub page_id: PageId,
    pub free_space: usize,
}

pub struct FreeSpaceIndex {
    buckets: Mutex<Vec<Vec<PageSpace>>>,
}

impl Default for FreeSpaceIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeSpaceIndex {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(vec![Vec::new(); BUCKET_COUNT]),
        }
    }

    fn bucket_for(free_space: usize) -> usize {
        // A nearly empty page has more free space than 40 * BUCKET_WIDTH;
        // the top bucket takes the spill.
        (free_space / BUCKET_WIDTH).min(BUCKET_COUNT - 1)
    }

    /// Make `page_id` available to allocators again, with `free_space` bytes
    /// left.
    pub fn add(&self, page_id: PageId, free_space: usize) {
        let mut buckets = self.buckets.lock();
        buckets[Self::bucket_for(free_space)].push(PageSpace {
            page_id,
            free_space,
        });
    }

    /// Find and remove a page with at least `needed` bytes free.
    ///
    /// Scans buckets from the one matching `needed` upward. Entries in the
    /// starting bucket may individually be too small and are checked; any
    /// entry in a higher bucket fits by construction.
    pub fn select(&self, needed: usize) -> Option<PageSpace> {
        if needed > PAGE_SIZE {
            return None;
        }
        let mut buckets = self.buckets.lock();
        for bucket in buckets[Self::bucket_for(needed)..].iter_mut() {
            if let Some(pos) = bucket.iter().position(|e| e.free_space >= needed) {
                return Some(bucket.swap_remove(pos));
            }
        }
        None
    }

    /// Total number of pages currently indexed.
    pub fn len(&self) -> usize {
        self.buckets.lock().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
