//! Index headers, bucket slots and overflow links.

use super::{be_u32, get_name, put_name, EntryType, NAME_FIELD_SIZE};
use crate::error::{CoreError, CoreResult};

/// Encoded size of an index header (the bucket table follows it).
pub const INDEX_HEADER_SIZE: usize = 260;

/// Encoded size of one bucket slot inside the table.
pub const BUCKET_SLOT_SIZE: usize = 20;

/// Encoded size of an overflow link entry.
pub const INDEX_EXTRA_SIZE: usize = 21;

/// Header of an index block.
///
/// Layout: `type(1) · properties(255, ';'-joined, NUL-padded) · bucketBytes(u32)`,
/// followed directly by `bucketBytes` bytes of [`BucketSlot`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    /// Indexed property names, sorted.
    pub properties: Vec<String>,
    /// Byte length of the bucket table.
    pub bucket_bytes: u32,
}

impl IndexHeader {
    /// Creates a header.
    #[must_use]
    pub fn new(properties: Vec<String>, bucket_bytes: u32) -> Self {
        Self {
            properties,
            bucket_bytes,
        }
    }

    /// The uniqueness key: property names joined by `;`.
    #[must_use]
    pub fn key(&self) -> String {
        self.properties.join(";")
    }

    /// Number of bucket slots in the table.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.bucket_bytes as usize / BUCKET_SLOT_SIZE
    }

    /// Full on-disk span of the block, bucket table included.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        INDEX_HEADER_SIZE as u64 + u64::from(self.bucket_bytes)
    }

    /// Encodes the header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the joined names exceed 255 bytes.
    pub fn encode(&self) -> CoreResult<[u8; INDEX_HEADER_SIZE]> {
        let mut buf = [0u8; INDEX_HEADER_SIZE];
        buf[0] = EntryType::Index.as_byte();
        put_name(&mut buf[1..1 + NAME_FIELD_SIZE], &self.key())?;
        buf[256..260].copy_from_slice(&self.bucket_bytes.to_be_bytes());
        Ok(buf)
    }

    /// Decodes the header at `offset`.
    pub fn decode(buf: &[u8], offset: usize) -> CoreResult<Self> {
        if buf.get(offset) != Some(&EntryType::Index.as_byte()) {
            return Err(CoreError::corrupted("expected an index header"));
        }
        let names = buf
            .get(offset + 1..offset + 1 + NAME_FIELD_SIZE)
            .ok_or_else(|| CoreError::corrupted("index header truncated"))?;
        let bucket_bytes = be_u32(buf, offset + 256)?;
        if bucket_bytes as usize % BUCKET_SLOT_SIZE != 0 {
            return Err(CoreError::corrupted(format!(
                "index bucket table of {bucket_bytes} bytes is not a whole number of slots"
            )));
        }
        Ok(Self {
            properties: get_name(names)?.split(';').map(str::to_string).collect(),
            bucket_bytes,
        })
    }
}

/// One bucket reference.
///
/// Inside the bucket table it is encoded as 20 bytes
/// (`hash · position · page · next · nextPage`, all u32). As an overflow link
/// the same fields follow a type byte, for 21 bytes total.
///
/// `position` and `next` are offsets relative to the start of their page.
/// `page == 0` marks an empty slot; `next_page == 0` ends the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketSlot {
    /// 31-bit hash of the indexed values.
    pub hash: u32,
    /// Page-relative offset of the referenced data entry.
    pub position: u32,
    /// Page holding the referenced data entry, 0 for an empty slot.
    pub page: u32,
    /// Page-relative offset of the next overflow link.
    pub next: u32,
    /// Page holding the next overflow link, 0 at the end of the chain.
    pub next_page: u32,
}

impl BucketSlot {
    /// Whether the slot references a record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.page == 0
    }

    /// Encodes the slot as it appears in the bucket table.
    #[must_use]
    pub fn encode_slot(&self) -> [u8; BUCKET_SLOT_SIZE] {
        let mut buf = [0u8; BUCKET_SLOT_SIZE];
        for (i, field) in [self.hash, self.position, self.page, self.next, self.next_page]
            .iter()
            .enumerate()
        {
            buf[i * 4..i * 4 + 4].copy_from_slice(&field.to_be_bytes());
        }
        buf
    }

    /// Decodes a slot from the bucket table at `offset`.
    pub fn decode_slot(buf: &[u8], offset: usize) -> CoreResult<Self> {
        Ok(Self {
            hash: be_u32(buf, offset)?,
            position: be_u32(buf, offset + 4)?,
            page: be_u32(buf, offset + 8)?,
            next: be_u32(buf, offset + 12)?,
            next_page: be_u32(buf, offset + 16)?,
        })
    }

    /// Encodes the slot as an overflow link entry.
    #[must_use]
    pub fn encode_extra(&self) -> [u8; INDEX_EXTRA_SIZE] {
        let mut buf = [0u8; INDEX_EXTRA_SIZE];
        buf[0] = EntryType::IndexExtra.as_byte();
        buf[1..].copy_from_slice(&self.encode_slot());
        buf
    }

    /// Decodes an overflow link entry at `offset`.
    pub fn decode_extra(buf: &[u8], offset: usize) -> CoreResult<Self> {
        if buf.get(offset) != Some(&EntryType::IndexExtra.as_byte()) {
            return Err(CoreError::corrupted("bucket chain points at a non-link entry"));
        }
        Self::decode_slot(buf, offset + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn key_joins_properties() {
        let header = IndexHeader::new(vec!["a".into(), "b".into()], 60);
        assert_eq!(header.key(), "a;b");
        assert_eq!(header.bucket_count(), 3);
        assert_eq!(header.block_size(), 320);

        let decoded = IndexHeader::decode(&header.encode().unwrap(), 0).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn oversized_names_are_rejected() {
        let header = IndexHeader::new(vec!["x".repeat(256)], 20);
        assert!(matches!(header.encode(), Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn ragged_bucket_table_is_corruption() {
        let mut buf = IndexHeader::new(vec!["id".into()], 20).encode().unwrap();
        buf[256..260].copy_from_slice(&21u32.to_be_bytes());
        assert!(matches!(IndexHeader::decode(&buf, 0), Err(CoreError::Corrupted { .. })));
    }

    #[test]
    fn empty_slot_is_all_zero() {
        let slot = BucketSlot::default();
        assert!(slot.is_empty());
        assert_eq!(slot.encode_slot(), [0u8; 20]);
    }

    proptest! {
        #[test]
        fn slot_roundtrip(
            hash in any::<u32>(),
            position in any::<u32>(),
            page in any::<u32>(),
            next in any::<u32>(),
            next_page in any::<u32>(),
        ) {
            let slot = BucketSlot { hash, position, page, next, next_page };
            prop_assert_eq!(BucketSlot::decode_slot(&slot.encode_slot(), 0).unwrap(), slot);
            prop_assert_eq!(BucketSlot::decode_extra(&slot.encode_extra(), 0).unwrap(), slot);
        }

        #[test]
        fn header_roundtrip(
            names in proptest::collection::vec("[a-z_]{1,12}", 1..5),
            slots in 0u32..100_000,
        ) {
            let header = IndexHeader::new(names, slots * 20);
            prop_assert_eq!(IndexHeader::decode(&header.encode().unwrap(), 0).unwrap(), header);
        }
    }
}
