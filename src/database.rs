//! High-level database handle that wires the storage components together.
//!
//! A database at base path `p` is two files: `p.db` (fixed-size pages, page 1
//! being the header page) and `p.log` (the write-ahead log). `Database`
//! drives the header-page crash-flag protocol on open/close and keeps the
//! free-space index populated for allocators.

use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::storage::page::{data_page, header_page};
use crate::storage::{FreeSpaceIndex, PageId, Pager, StorageResult, Wal};

const DB_SUFFIX: &str = "db";
const LOG_SUFFIX: &str = "log";

pub struct Database {
    pager: Pager,
    wal: Wal,
    free_space: FreeSpaceIndex,
    /// Whether the header page said the previous session closed cleanly.
    last_session_clean: bool,
}

fn db_path(base: &Path) -> PathBuf {
    base.with_extension(DB_SUFFIX)
}

fn log_path(base: &Path) -> PathBuf {
    base.with_extension(LOG_SUFFIX)
}

impl Database {
    /// Create a new database at `base`, with `memory` bytes of page-cache
    /// budget. Allocates the header page and stamps it open.
    pub fn create(base: &Path, memory: u64) -> StorageResult<Self> {
        let pager = Pager::create(&db_path(base), memory)?;
        let wal = Wal::create(&log_path(base))?;

        let header = pager.new_page(&header_page::init_raw())?;
        debug_assert_eq!(header, PageId(1));
        info!("created database at {}", base.display());

        Ok(Self {
            pager,
            wal,
            free_space: FreeSpaceIndex::new(),
            last_session_clean: true,
        })
    }

    /// Open an existing database, verify the log, check the crash flag,
    /// restamp the header page, and index the free space of every ordinary
    /// page.
    pub fn open(base: &Path, memory: u64) -> StorageResult<Self> {
        let pager = Pager::open(&db_path(base), memory)?;
        let wal = Wal::open(&log_path(base))?;

        let header = pager.get_page(PageId(1))?;
        let last_session_clean = header_page::is_clean(&header);
        if !last_session_clean {
            warn!(
                "database at {} was not closed cleanly; log replay is required",
                base.display()
            );
        }

        // Stamp this session open right away so a crash from here on is
        // detected by the next open.
        header_page::set_open(&header);
        Self::flush_and_release(&pager, &header)?;

        let db = Self {
            pager,
            wal,
            free_space: FreeSpaceIndex::new(),
            last_session_clean,
        };
        db.rebuild_free_space_index()?;
        Ok(db)
    }

    fn flush_and_release(
        pager: &Pager,
        page: &crate::storage::Page,
    ) -> StorageResult<()> {
        pager.flush_page(page)?;
        page.clear_dirty();
        pager.release(page)
    }

    /// Scan every ordinary page and index its remaining free space.
    fn rebuild_free_space_index(&self) -> StorageResult<()> {
        for no in 2..=self.pager.page_count() {
            let page = self.pager.get_page(PageId(no))?;
            self.free_space.add(page.id(), data_page::free_space(&page));
            self.pager.release(&page)?;
        }
        Ok(())
    }

    /// Whether the previous session wrote its close stamp. When false, the
    /// caller must replay the log before trusting page contents.
    pub fn last_session_clean(&self) -> bool {
        self.last_session_clean
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn free_space(&self) -> &FreeSpaceIndex {
        &self.free_space
    }

    /// Allocate a fresh ordinary page and make it available to allocators.
    pub fn allocate_page(&self) -> StorageResult<PageId> {
        let id = self.pager.new_page(&data_page::init_raw())?;
        self.free_space.add(id, data_page::MAX_FREE_SPACE);
        Ok(id)
    }

    /// Write the close stamp and flush everything. The handle must not be
    /// used afterwards.
    pub fn close(&self) -> StorageResult<()> {
        let header = self.pager.get_page(PageId(1))?;
        header_page::set_close(&header);
        self.pager.release(&header)?;

        self.pager.close()?;
        self.wal.close()?;
        info!("database closed cleanly");
        Ok(())
    }
}
