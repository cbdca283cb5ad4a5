//! Layout of ordinary pages (page 2 onward).
//!
//! Bytes `[0..2)` hold the free-space offset (FSO), a big-endian u16 marking
//! the first unused byte. A fresh page has FSO = 2; the invariant is
//! `2 <= FSO <= PAGE_SIZE` and every byte in `[FSO, PAGE_SIZE)` is unused.
//!
//! All mutators mark the page dirty but never persist it; durability is the
//! pager's job.

use byteorder::{BigEndian, ByteOrder};

use super::{Page, PAGE_SIZE};

const FSO_OFFSET: usize = 0;
const DATA_OFFSET: usize = 2;

/// Largest payload an empty ordinary page can take.
pub const MAX_FREE_SPACE: usize = PAGE_SIZE - DATA_OFFSET;

/// Fresh ordinary-page bytes with the FSO pointing just past itself.
pub fn init_raw() -> Box<[u8; PAGE_SIZE]> {
    let mut raw = Box::new([0u8; PAGE_SIZE]);
    write_fso(&mut *raw, DATA_OFFSET as u16);
    raw
}

fn read_fso(raw: &[u8; PAGE_SIZE]) -> u16 {
    BigEndian::read_u16(&raw[FSO_OFFSET..FSO_OFFSET + 2])
}

fn write_fso(raw: &mut [u8; PAGE_SIZE], fso: u16) {
    BigEndian::write_u16(&mut raw[FSO_OFFSET..FSO_OFFSET + 2], fso);
}

/// Current free-space offset of `page`.
pub fn fso(page: &Page) -> u16 {
    read_fso(&page.data())
}

/// Unused bytes remaining in `page`.
pub fn free_space(page: &Page) -> usize {
    PAGE_SIZE - fso(page) as usize
}

/// Append `bytes` at the free-space offset, advance the FSO, and return the
/// offset the data was written at.
pub fn insert(page: &Page, bytes: &[u8]) -> crate::storage::StorageResult<u16> {
    let mut data = page.data();
    let offset = read_fso(&data) as usize;
    let available = PAGE_SIZE - offset;
    if bytes.len() > available {
        return Err(crate::storage::StorageError::DataTooLarge {
            len: bytes.len(),
            available,
        });
    }

    page.mark_dirty();
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
    write_fso(&mut data, (offset + bytes.len()) as u16);
    Ok(offset as u16)
}

/// Write `bytes` at an explicit offset during log replay, advancing the FSO
/// only if the write extends past it.
pub fn recover_insert(
    page: &Page,
    bytes: &[u8],
    offset: u16,
) -> crate::storage::StorageResult<()> {
    let end = offset as usize + bytes.len();
    if end > PAGE_SIZE {
        return Err(crate::storage::StorageError::DataTooLarge {
            len: bytes.len(),
            available: PAGE_SIZE - offset as usize,
        });
    }

    page.mark_dirty();
    let mut data = page.data();
    data[offset as usize..end].copy_from_slice(bytes);
    if read_fso(&data) < end as u16 {
        write_fso(&mut data, end as u16);
    }
    Ok(())
}

/// Write `bytes` at an explicit offset during log replay without touching
/// the FSO (in-place update).
pub fn recover_update(
    page: &Page,
    bytes: &[u8],
    offset: u16,
) -> crate::storage::StorageResult<()> {
    let end = offset as usize + bytes.len();
    if end > PAGE_SIZE {
        return Err(crate::storage::StorageError::DataTooLarge {
            len: bytes.len(),
            available: PAGE_SIZE - offset as usize,
        });
    }

    page.mark_dirty();
    page.data()[offset as usize..end].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageId;
    use crate::storage::StorageError;

    fn data_page() -> Page {
        Page::new(PageId(2), init_raw())
    }

    #[test]
    fn test_fresh_page_layout() {
        let page = data_page();
        assert_eq!(fso(&page), 2);
        assert_eq!(free_space(&page), PAGE_SIZE - 2);
    }

    #[test]
    fn test_insert_advances_fso() {
        let page = data_page();

        let off1 = insert(&page, b"hello").unwrap();
        assert_eq!(off1, 2);
        assert_eq!(fso(&page), 7);

        let off2 = insert(&page, b"world!").unwrap();
        assert_eq!(off2, 7);
        assert_eq!(fso(&page), 13);

        let data = page.data();
        assert_eq!(&data[2..7], b"hello");
        assert_eq!(&data[7..13], b"world!");
        assert!(page.is_dirty());
    }

    #[test]
    fn test_free_space_decreases_by_inserted_lengths() {
        let page = data_page();
        let mut expected = PAGE_SIZE - 2;
        for len in [1usize, 50, 200, 4000] {
            insert(&page, &vec![0xAB; len]).unwrap();
            expected -= len;
            assert_eq!(free_space(&page), expected);
        }
    }

    #[test]
    fn test_insert_never_writes_past_page_end() {
        let page = data_page();
        insert(&page, &vec![1u8; MAX_FREE_SPACE]).unwrap();
        assert_eq!(fso(&page) as usize, PAGE_SIZE);
        assert_eq!(free_space(&page), 0);

        match insert(&page, b"x") {
            Err(StorageError::DataTooLarge { len, available }) => {
                assert_eq!(len, 1);
                assert_eq!(available, 0);
            }
            other => panic!("expected DataTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_insert_is_rejected_whole() {
        let page = data_page();
        assert!(matches!(
            insert(&page, &vec![0u8; PAGE_SIZE]),
            Err(StorageError::DataTooLarge { .. })
        ));
        // Nothing was written.
        assert_eq!(fso(&page), 2);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_recover_insert_extends_fso_only_forward() {
        let page = data_page();
        insert(&page, &[1u8; 10]).unwrap();
        assert_eq!(fso(&page), 12);

        // Replay of a write inside the used region leaves the FSO alone.
        recover_insert(&page, &[2u8; 4], 2).unwrap();
        assert_eq!(fso(&page), 12);

        // Replay past the FSO advances it.
        recover_insert(&page, &[3u8; 8], 20).unwrap();
        assert_eq!(fso(&page), 28);
    }

    #[test]
    fn test_recover_update_never_touches_fso() {
        let page = data_page();
        insert(&page, &[1u8; 10]).unwrap();

        recover_update(&page, &[9u8; 4], 100).unwrap();
        assert_eq!(fso(&page), 12);
        assert_eq!(page.data()[100], 9);
    }

    #[test]
    fn test_recover_writes_are_bounds_checked() {
        let page = data_page();
        assert!(recover_insert(&page, &[0u8; 16], (PAGE_SIZE - 8) as u16).is_err());
        assert!(recover_update(&page, &[0u8; 16], (PAGE_SIZE - 8) as u16).is_err());
    }
}
