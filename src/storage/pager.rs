//! Page cache over the database file.
//!
//! `Pager` specializes the generic reference-counted cache to pages: the
//! load hook reads one page from the file, the evict hook flushes it back if
//! dirty. File I/O is serialized by its own lock, distinct from the cache's
//! bookkeeping lock, so a slow disk write never blocks unrelated cache
//! operations.

use log::debug;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::cache::{EvictFn, LoadFn, ResourceCache};
use super::disk::DbFile;
use super::error::{StorageError, StorageResult};
use super::page::{Page, PageId, PAGE_SIZE};

/// Smallest usable cache, in pages. Budgets below this fail with
/// `MemoryTooSmall`.
pub const MIN_CACHE_PAGES: usize = 8;

pub struct Pager {
    cache: ResourceCache<Arc<Page>>,
    file: Arc<Mutex<DbFile>>,
    /// Highest allocated page number, 1-based.
    page_count: AtomicU32,
}

impl Pager {
    /// Create a new database file and a pager over it. `memory` is the cache
    /// budget in bytes, converted to a maximum resident page count.
    pub fn create(path: &Path, memory: u64) -> StorageResult<Self> {
        let max_pages = Self::budget_to_pages(memory)?;
        let file = DbFile::create(path)?;
        Ok(Self::build(file, max_pages, 0))
    }

    /// Open an existing database file.
    pub fn open(path: &Path, memory: u64) -> StorageResult<Self> {
        let max_pages = Self::budget_to_pages(memory)?;
        let file = DbFile::open(path)?;
        let page_count = file.page_count()?;
        Ok(Self::build(file, max_pages, page_count))
    }

    fn budget_to_pages(memory: u64) -> StorageResult<usize> {
        let pages = (memory / PAGE_SIZE as u64) as usize;
        if pages < MIN_CACHE_PAGES {
            return Err(StorageError::MemoryTooSmall {
                budget: memory,
                pages,
                min: MIN_CACHE_PAGES,
            });
        }
        Ok(pages)
    }

    fn build(file: DbFile, max_pages: usize, page_count: u32) -> Self {
        let file = Arc::new(Mutex::new(file));

        let load_file = file.clone();
        let load: LoadFn<Arc<Page>> = Box::new(move |key| {
            let id = PageId(key as u32);
            let data = load_file.lock().read_page(id)?;
            Ok(Arc::new(Page::new(id, data)))
        });

        let evict_file = file.clone();
        let evict: EvictFn<Arc<Page>> = Box::new(move |page| {
            if page.is_dirty() {
                debug!("flushing dirty page {} on eviction", page.id());
                let data = page.data();
                evict_file.lock().write_page(page.id(), &data)?;
                page.clear_dirty();
            }
            Ok(())
        });

        Self {
            cache: ResourceCache::new(max_pages, load, evict),
            file,
            page_count: AtomicU32::new(page_count),
        }
    }

    /// Allocate the next page number and immediately flush `init` to its
    /// file offset. The new page is not cache-resident afterwards.
    pub fn new_page(&self, init: &[u8; PAGE_SIZE]) -> StorageResult<PageId> {
        let id = PageId(self.page_count.fetch_add(1, Ordering::SeqCst) + 1);
        self.file.lock().write_page(id, init)?;
        debug!("allocated page {}", id);
        Ok(id)
    }

    /// Fetch a page, reading it from file on a cache miss. Every successful
    /// call must be paired with a `release`.
    pub fn get_page(&self, id: PageId) -> StorageResult<Arc<Page>> {
        self.cache.get(id.key())
    }

    /// Drop one reference to `page`. When the last reference goes, the page
    /// is flushed if dirty and evicted. The handle must not be used after
    /// this returns.
    pub fn release(&self, page: &Page) -> StorageResult<()> {
        self.cache.release(page.id().key())
    }

    /// Write the page to its file offset and force it durable, regardless of
    /// the dirty flag.
    pub fn flush_page(&self, page: &Page) -> StorageResult<()> {
        let data = page.data();
        self.file.lock().write_page(page.id(), &data)?;
        Ok(())
    }

    /// Shrink the file to exactly `max_page` pages and reset the allocation
    /// counter. Recovery-time operation; the cache must be quiesced.
    pub fn truncate_by_page(&self, max_page: u32) -> StorageResult<()> {
        self.file.lock().truncate_pages(max_page)?;
        self.page_count.store(max_page, Ordering::SeqCst);
        Ok(())
    }

    /// Current highest allocated page number.
    pub fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::SeqCst)
    }

    /// Flush and evict every cached page, then sync the file.
    pub fn close(&self) -> StorageResult<()> {
        self.cache.close()?;
        self.file.lock().sync()?;
        Ok(())
    }

    /// Number of pages currently materialized in the cache.
    pub fn resident_pages(&self) -> usize {
        self.cache.len()
    }
}
