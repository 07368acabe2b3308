//! On-disk entry layouts.
//!
//! Every byte of a slotdb file past the header belongs to exactly one entry,
//! and every entry starts with a one-byte type tag. That tag plus a few
//! fixed fields is enough to know how long the entry is, which is what
//! makes a page scan self-describing.
//!
//! All multi-byte integers are big-endian.

mod data;
mod free;
mod header;
mod index;
mod page;
mod sequence;

pub use data::DataEntry;
pub use free::FreeEntry;
pub use header::{Header, FORMAT_VERSION, HEADER_SIZE};
pub use index::{BucketSlot, IndexHeader, BUCKET_SLOT_SIZE, INDEX_EXTRA_SIZE, INDEX_HEADER_SIZE};
pub use page::{Page, PAGE_ENTRY_SIZE};
pub use sequence::{SequenceEntry, SequenceKind, SEQUENCE_ENTRY_SIZE};

use crate::error::{CoreError, CoreResult};

/// Length of the NUL-padded name field shared by index and sequence entries.
pub const NAME_FIELD_SIZE: usize = 255;

/// Type tag stored in byte 0 of every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// A live record.
    Data = 1,
    /// A reclaimed slot on the free list.
    Free = 3,
    /// A page descriptor.
    Page = 4,
    /// An index header followed by its bucket table.
    Index = 5,
    /// An overflow link in an index bucket chain.
    IndexExtra = 6,
    /// A named sequence.
    Sequence = 7,
}

impl EntryType {
    /// Converts a byte to an entry type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Data),
            3 => Some(Self::Free),
            4 => Some(Self::Page),
            5 => Some(Self::Index),
            6 => Some(Self::IndexExtra),
            7 => Some(Self::Sequence),
            _ => None,
        }
    }

    /// Converts the entry type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded entry of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A live record.
    Data(DataEntry),
    /// A reclaimed slot.
    Free(FreeEntry),
    /// A page descriptor.
    Page(Page),
    /// An index header (the bucket table is not decoded here).
    Index(IndexHeader),
    /// An overflow bucket link.
    IndexExtra(BucketSlot),
    /// A named sequence.
    Sequence(SequenceEntry),
}

impl Entry {
    /// Decodes the entry starting at `offset`, dispatching on its type tag.
    ///
    /// `position` is the absolute file offset of `buf[offset]`; it is only
    /// used to fill in the `start` of positioned entries.
    pub fn decode(buf: &[u8], offset: usize, position: u64) -> CoreResult<Self> {
        let tag = *buf
            .get(offset)
            .ok_or_else(|| CoreError::corrupted(format!("no entry at {position}")))?;
        let kind = EntryType::from_byte(tag).ok_or_else(|| {
            CoreError::corrupted(format!("unknown entry type {tag} at {position}"))
        })?;
        Ok(match kind {
            EntryType::Data => Self::Data(DataEntry::decode(buf, offset)?),
            EntryType::Free => Self::Free(FreeEntry::decode(buf, offset)?),
            EntryType::Page => Self::Page(Page::decode(buf, offset, position)?),
            EntryType::Index => Self::Index(IndexHeader::decode(buf, offset)?),
            EntryType::IndexExtra => Self::IndexExtra(BucketSlot::decode_extra(buf, offset)?),
            EntryType::Sequence => Self::Sequence(SequenceEntry::decode(buf, offset, position)?),
        })
    }

    /// Returns the type tag of this entry.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Data(_) => EntryType::Data,
            Self::Free(_) => EntryType::Free,
            Self::Page(_) => EntryType::Page,
            Self::Index(_) => EntryType::Index,
            Self::IndexExtra(_) => EntryType::IndexExtra,
            Self::Sequence(_) => EntryType::Sequence,
        }
    }
}

/// Reads the type tag and on-disk span of the entry at `offset`.
///
/// Only the fixed prefix of the entry needs to be present in `buf`
/// (at most [`INDEX_HEADER_SIZE`] bytes).
pub fn entry_span(buf: &[u8], offset: usize) -> CoreResult<(EntryType, u64)> {
    let tag = *buf
        .get(offset)
        .ok_or_else(|| CoreError::corrupted("entry offset outside buffer"))?;
    let kind = EntryType::from_byte(tag)
        .ok_or_else(|| CoreError::corrupted(format!("unknown entry type {tag}")))?;
    let span = match kind {
        EntryType::Data => u64::from(be_u32(buf, offset + 5)?),
        EntryType::Free => FreeEntry::HEADER_SIZE as u64 + u64::from(be_u32(buf, offset + 1)?),
        EntryType::Page => PAGE_ENTRY_SIZE as u64,
        EntryType::Index => INDEX_HEADER_SIZE as u64 + u64::from(be_u32(buf, offset + 256)?),
        EntryType::IndexExtra => INDEX_EXTRA_SIZE as u64,
        EntryType::Sequence => SEQUENCE_ENTRY_SIZE as u64,
    };
    if span == 0 {
        return Err(CoreError::corrupted("zero-length entry"));
    }
    Ok((kind, span))
}

pub(crate) fn be_u32(buf: &[u8], at: usize) -> CoreResult<u32> {
    let bytes: [u8; 4] = buf
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CoreError::corrupted(format!("truncated u32 at {at}")))?;
    Ok(u32::from_be_bytes(bytes))
}

pub(crate) fn be_u64(buf: &[u8], at: usize) -> CoreResult<u64> {
    let bytes: [u8; 8] = buf
        .get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CoreError::corrupted(format!("truncated u64 at {at}")))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Writes `name` NUL-padded into a fixed-width field.
pub(crate) fn put_name(field: &mut [u8], name: &str) -> CoreResult<()> {
    let bytes = name.as_bytes();
    if bytes.len() > field.len() {
        return Err(CoreError::invalid_argument(format!(
            "name '{name}' is {} bytes, limit is {}",
            bytes.len(),
            field.len()
        )));
    }
    field[..bytes.len()].copy_from_slice(bytes);
    field[bytes.len()..].fill(0);
    Ok(())
}

/// Reads a NUL-padded name field.
pub(crate) fn get_name(field: &[u8]) -> CoreResult<String> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| CoreError::corrupted("name field is not valid UTF-8"))
}
