//! Free entries: reclaimed slots linked into the free list.

use super::{be_u32, be_u64, EntryType};
use crate::error::{CoreError, CoreResult};

/// A reclaimed slot.
///
/// Layout: `type(1) · size(u32) · next(u64)`, followed by `size` bytes that
/// are left as they were. The logical span is `13 + size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeEntry {
    /// Bytes following the 13-byte header.
    pub size: u32,
    /// Absolute offset of the next free slot, 0 at the end of the list.
    pub next: u64,
}

impl FreeEntry {
    /// Encoded header length.
    pub const HEADER_SIZE: usize = 13;

    /// Offset of the `next` field inside the entry.
    pub const NEXT_OFFSET: u64 = 5;

    /// Builds a free entry spanning exactly `total_size` bytes.
    pub fn covering(total_size: u64, next: u64) -> CoreResult<Self> {
        let size = total_size
            .checked_sub(Self::HEADER_SIZE as u64)
            .and_then(|s| u32::try_from(s).ok())
            .ok_or_else(|| {
                CoreError::corrupted(format!("cannot free a span of {total_size} bytes"))
            })?;
        Ok(Self { size, next })
    }

    /// On-disk span of the slot.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        Self::HEADER_SIZE as u64 + u64::from(self.size)
    }

    /// Largest data payload the slot can take.
    #[must_use]
    pub fn data_capacity(&self) -> u64 {
        self.total_size() - super::DataEntry::HEADER_SIZE as u64
    }

    /// Encodes the 13-byte header.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::HEADER_SIZE] {
        let mut buf = [0u8; Self::HEADER_SIZE];
        buf[0] = EntryType::Free.as_byte();
        buf[1..5].copy_from_slice(&self.size.to_be_bytes());
        buf[5..13].copy_from_slice(&self.next.to_be_bytes());
        buf
    }

    /// Decodes the header at `offset`.
    pub fn decode(buf: &[u8], offset: usize) -> CoreResult<Self> {
        if buf.get(offset) != Some(&EntryType::Free.as_byte()) {
            return Err(CoreError::corrupted("free list points at a non-free entry"));
        }
        Ok(Self {
            size: be_u32(buf, offset + 1)?,
            next: be_u64(buf, offset + 5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn covering_matches_span() {
        let free = FreeEntry::covering(59, 1234).unwrap();
        assert_eq!(free.size, 46);
        assert_eq!(free.total_size(), 59);
        assert_eq!(free.data_capacity(), 50);
    }

    #[test]
    fn covering_rejects_short_spans() {
        assert!(FreeEntry::covering(12, 0).is_err());
    }

    #[test]
    fn decode_rejects_wrong_tag() {
        let mut buf = FreeEntry::covering(13, 0).unwrap().encode();
        buf[0] = EntryType::Data.as_byte();
        assert!(matches!(FreeEntry::decode(&buf, 0), Err(CoreError::Corrupted { .. })));
    }

    proptest! {
        #[test]
        fn roundtrip(size in any::<u32>(), next in any::<u64>()) {
            let free = FreeEntry { size, next };
            prop_assert_eq!(FreeEntry::decode(&free.encode(), 0).unwrap(), free);
        }
    }
}
