//! Layout of the header page (page 1).
//!
//! Bytes `[100..108)` hold a random stamp written when the database opens;
//! bytes `[108..116)` receive a copy of it only at clean shutdown. If the two
//! slots differ on the next open, the previous session crashed.

use rand::RngCore;

use super::{Page, PAGE_SIZE};

const STAMP_OFFSET: usize = 100;
const STAMP_LEN: usize = 8;

/// Fresh header-page bytes with a new open stamp and an empty close slot.
pub fn init_raw() -> Box<[u8; PAGE_SIZE]> {
    let mut raw = Box::new([0u8; PAGE_SIZE]);
    write_open_stamp(&mut *raw);
    raw
}

fn write_open_stamp(raw: &mut [u8; PAGE_SIZE]) {
    rand::thread_rng().fill_bytes(&mut raw[STAMP_OFFSET..STAMP_OFFSET + STAMP_LEN]);
}

/// Stamp the open slot with fresh random bytes. Done on every startup so a
/// crash leaves the close slot stale.
pub fn set_open(page: &Page) {
    page.mark_dirty();
    write_open_stamp(&mut page.data());
}

/// Copy the open stamp into the close slot. Done only at clean shutdown.
pub fn set_close(page: &Page) {
    page.mark_dirty();
    let mut data = page.data();
    data.copy_within(
        STAMP_OFFSET..STAMP_OFFSET + STAMP_LEN,
        STAMP_OFFSET + STAMP_LEN,
    );
}

/// Whether the previous session closed cleanly.
pub fn is_clean(page: &Page) -> bool {
    let data = page.data();
    data[STAMP_OFFSET..STAMP_OFFSET + STAMP_LEN]
        == data[STAMP_OFFSET + STAMP_LEN..STAMP_OFFSET + 2 * STAMP_LEN]
}
