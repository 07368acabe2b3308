//! Page descriptors.

use super::{be_u32, be_u64, EntryType};
use crate::error::{CoreError, CoreResult};
use serde::Serialize;

/// Encoded size of a page entry.
pub const PAGE_ENTRY_SIZE: usize = 33;

/// A page: the byte range `[start, end)` of the file holding data, free and
/// index-extra entries, preceded by its own 33-byte descriptor.
///
/// Layout: `type(1) · number(u32) · count(u32) · end(u64) · next(u64) · uses(u64)`.
/// `start` is not stored; it is the offset the descriptor was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Absolute offset of the descriptor.
    pub start: u64,
    /// 1-based page number, stable for the life of the file.
    pub number: u32,
    /// Live data entries in the page.
    pub count: u32,
    /// One past the last byte of the page. Only ever grows.
    pub end: u64,
    /// Offset of the next page descriptor, 0 for the last page.
    pub next: u64,
    /// Last access time in milliseconds since the epoch.
    pub uses: u64,
}

impl Page {
    /// Offset of the `count` field inside the descriptor.
    pub const COUNT_OFFSET: u64 = 5;

    /// Offset of the `next` field inside the descriptor.
    pub const NEXT_OFFSET: u64 = 17;

    /// Offset of the `uses` field inside the descriptor.
    pub const USES_OFFSET: u64 = 25;

    /// A fresh, empty page whose descriptor sits at `start`.
    #[must_use]
    pub fn new(number: u32, start: u64, uses: u64) -> Self {
        Self {
            start,
            number,
            count: 0,
            end: start + PAGE_ENTRY_SIZE as u64,
            next: 0,
            uses,
        }
    }

    /// First byte after the descriptor.
    #[must_use]
    pub fn body_start(&self) -> u64 {
        self.start + PAGE_ENTRY_SIZE as u64
    }

    /// Whether `position` lies inside the page.
    #[must_use]
    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end
    }

    /// Encodes the full descriptor.
    #[must_use]
    pub fn encode(&self) -> [u8; PAGE_ENTRY_SIZE] {
        let mut buf = [0u8; PAGE_ENTRY_SIZE];
        buf[0] = EntryType::Page.as_byte();
        buf[1..5].copy_from_slice(&self.number.to_be_bytes());
        buf[5..17].copy_from_slice(&self.count_and_end());
        buf[17..25].copy_from_slice(&self.next.to_be_bytes());
        buf[25..33].copy_from_slice(&self.uses.to_be_bytes());
        buf
    }

    /// The 12 bytes written at `start + COUNT_OFFSET` when count or end change.
    #[must_use]
    pub fn count_and_end(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[..4].copy_from_slice(&self.count.to_be_bytes());
        buf[4..].copy_from_slice(&self.end.to_be_bytes());
        buf
    }

    /// Decodes a descriptor read from absolute offset `start`.
    pub fn decode(buf: &[u8], offset: usize, start: u64) -> CoreResult<Self> {
        if buf.get(offset) != Some(&EntryType::Page.as_byte()) {
            return Err(CoreError::corrupted(format!("no page descriptor at {start}")));
        }
        let page = Self {
            start,
            number: be_u32(buf, offset + 1)?,
            count: be_u32(buf, offset + 5)?,
            end: be_u64(buf, offset + 9)?,
            next: be_u64(buf, offset + 17)?,
            uses: be_u64(buf, offset + 25)?,
        };
        if page.end < page.body_start() {
            return Err(CoreError::corrupted(format!(
                "page {} ends at {} before its descriptor does",
                page.number, page.end
            )));
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_page_is_just_a_descriptor() {
        let page = Page::new(3, 500, 42);
        assert_eq!(page.end, 533);
        assert_eq!(page.body_start(), 533);
        assert!(page.contains(500));
        assert!(!page.contains(533));
    }

    #[test]
    fn count_and_end_land_at_field_offset() {
        let page = Page {
            start: 0,
            number: 1,
            count: 7,
            end: 900,
            next: 0,
            uses: 0,
        };
        let full = page.encode();
        let at = Page::COUNT_OFFSET as usize;
        assert_eq!(&full[at..at + 12], &page.count_and_end());
        let at = Page::USES_OFFSET as usize;
        assert_eq!(&full[at..at + 8], &page.uses.to_be_bytes());
    }

    proptest! {
        #[test]
        fn roundtrip(
            start in 0u64..u64::MAX / 2,
            number in any::<u32>(),
            count in any::<u32>(),
            grow in 0u64..u64::MAX / 4,
            next in any::<u64>(),
            uses in any::<u64>(),
        ) {
            let page = Page { start, number, count, end: start + 33 + grow, next, uses };
            prop_assert_eq!(Page::decode(&page.encode(), 0, start).unwrap(), page);
        }
    }
}
