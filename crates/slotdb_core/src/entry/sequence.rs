//! Sequence entries.

use super::{be_u32, be_u64, get_name, put_name, EntryType, NAME_FIELD_SIZE};
use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Encoded size of a sequence entry.
pub const SEQUENCE_ENTRY_SIZE: usize = 288;

/// What a sequence generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(u32)]
pub enum SequenceKind {
    /// An arithmetic counter.
    #[default]
    Number = 1,
    /// The insertion timestamp.
    Date = 2,
    /// A random v4 UUID.
    Uuid = 3,
}

impl SequenceKind {
    /// Converts the stored code to a kind.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Number),
            2 => Some(Self::Date),
            3 => Some(Self::Uuid),
            _ => None,
        }
    }

    /// Converts the kind to its stored code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl FromStr for SequenceKind {
    type Err = std::convert::Infallible;

    /// Accepts the common spellings of UUID and `Date`; anything else is a number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "uuid" | "UUID" | "guid" | "Guid" | "GUID" => Self::Uuid,
            "Date" => Self::Date,
            _ => Self::Number,
        })
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "Number",
            Self::Date => "Date",
            Self::Uuid => "UUID",
        })
    }
}

/// A named sequence.
///
/// Layout: `type(1) · property(255, NUL-padded) · startAt(u64) ·
/// increment(u32) · kind(u32) · value(u64) · next(u64)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceEntry {
    /// Absolute offset of the entry (not stored).
    pub start: u64,
    /// Record property the sequence fills.
    pub property: String,
    /// First value handed out.
    pub start_at: u64,
    /// Step between values.
    pub increment: u32,
    /// What the sequence generates.
    pub kind: SequenceKind,
    /// Last value handed out.
    pub value: u64,
    /// Offset of the next sequence entry, 0 at the end of the list.
    pub next: u64,
}

impl SequenceEntry {
    /// Offset of the `value` field inside the entry.
    pub const VALUE_OFFSET: u64 = 272;

    /// Encodes the entry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the property name exceeds 255 bytes.
    pub fn encode(&self) -> CoreResult<[u8; SEQUENCE_ENTRY_SIZE]> {
        let mut buf = [0u8; SEQUENCE_ENTRY_SIZE];
        buf[0] = EntryType::Sequence.as_byte();
        put_name(&mut buf[1..1 + NAME_FIELD_SIZE], &self.property)?;
        buf[256..264].copy_from_slice(&self.start_at.to_be_bytes());
        buf[264..268].copy_from_slice(&self.increment.to_be_bytes());
        buf[268..272].copy_from_slice(&self.kind.code().to_be_bytes());
        buf[272..280].copy_from_slice(&self.value.to_be_bytes());
        buf[280..288].copy_from_slice(&self.next.to_be_bytes());
        Ok(buf)
    }

    /// Decodes the entry at `offset`, which was read from absolute `start`.
    pub fn decode(buf: &[u8], offset: usize, start: u64) -> CoreResult<Self> {
        if buf.get(offset) != Some(&EntryType::Sequence.as_byte()) {
            return Err(CoreError::corrupted(format!("no sequence entry at {start}")));
        }
        let name = buf
            .get(offset + 1..offset + 1 + NAME_FIELD_SIZE)
            .ok_or_else(|| CoreError::corrupted("sequence entry truncated"))?;
        let code = be_u32(buf, offset + 268)?;
        Ok(Self {
            start,
            property: get_name(name)?,
            start_at: be_u64(buf, offset + 256)?,
            increment: be_u32(buf, offset + 264)?,
            kind: SequenceKind::from_code(code).ok_or_else(|| {
                CoreError::corrupted(format!("unknown sequence type {code} at {start}"))
            })?,
            value: be_u64(buf, offset + 272)?,
            next: be_u64(buf, offset + 280)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn kind_spellings() {
        for s in ["uuid", "UUID", "guid", "Guid", "GUID"] {
            assert_eq!(s.parse::<SequenceKind>().unwrap(), SequenceKind::Uuid);
        }
        assert_eq!("Date".parse::<SequenceKind>().unwrap(), SequenceKind::Date);
        assert_eq!("date".parse::<SequenceKind>().unwrap(), SequenceKind::Number);
        assert_eq!("Number".parse::<SequenceKind>().unwrap(), SequenceKind::Number);
    }

    #[test]
    fn value_field_offset() {
        let entry = SequenceEntry {
            start: 0,
            property: "id".into(),
            start_at: 1,
            increment: 1,
            kind: SequenceKind::Number,
            value: 0xDEAD_BEEF,
            next: 0,
        };
        let buf = entry.encode().unwrap();
        let at = SequenceEntry::VALUE_OFFSET as usize;
        assert_eq!(&buf[at..at + 8], &0xDEAD_BEEFu64.to_be_bytes());
    }

    #[test]
    fn unknown_kind_is_corruption() {
        let entry = SequenceEntry {
            start: 0,
            property: "id".into(),
            start_at: 1,
            increment: 1,
            kind: SequenceKind::Number,
            value: 0,
            next: 0,
        };
        let mut buf = entry.encode().unwrap();
        buf[268..272].copy_from_slice(&9u32.to_be_bytes());
        assert!(matches!(
            SequenceEntry::decode(&buf, 0, 0),
            Err(CoreError::Corrupted { .. })
        ));
    }

    proptest! {
        #[test]
        fn roundtrip(
            property in "[a-zA-Z_]{1,40}",
            start_at in any::<u64>(),
            increment in any::<u32>(),
            kind in prop_oneof![
                Just(SequenceKind::Number),
                Just(SequenceKind::Date),
                Just(SequenceKind::Uuid),
            ],
            value in any::<u64>(),
            next in any::<u64>(),
            start in any::<u64>(),
        ) {
            let entry = SequenceEntry { start, property, start_at, increment, kind, value, next };
            let bytes = entry.encode().unwrap();
            prop_assert_eq!(SequenceEntry::decode(&bytes, 0, start).unwrap(), entry);
        }
    }
}
