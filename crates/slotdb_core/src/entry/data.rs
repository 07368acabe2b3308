//! Data entries: one serialized record each.

use super::{be_u32, EntryType};
use crate::error::{CoreError, CoreResult};

/// A live record.
///
/// Layout: `type(1) · size(u32) · totalSize(u32) · payload`. The payload
/// region is `totalSize - 9` bytes; only the first `size` are meaningful and
/// the rest is zero padding. The padding is what lets an update that
/// shrinks the record rewrite it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    /// Serialized payload (UTF-8 JSON).
    pub payload: Vec<u8>,
    /// Full on-disk span of the entry, header included.
    pub total_size: u32,
}

impl DataEntry {
    /// Bytes preceding the payload.
    pub const HEADER_SIZE: usize = 9;

    /// Smallest payload region ever allocated.
    pub const MIN_PAYLOAD: u32 = 4;

    /// Builds an entry for `payload`.
    ///
    /// With `slot` set, the entry takes over a pre-allocated span of that
    /// many bytes (a reused free slot); otherwise it gets the minimal span.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload does not fit in a u32 length
    /// or does not fit in `slot`.
    pub fn new(payload: Vec<u8>, slot: Option<u32>) -> CoreResult<Self> {
        let size = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_argument("record payload exceeds 4 GiB"))?;
        let required = Self::required_size(size)?;
        let total_size = match slot {
            Some(slot) if slot < required => {
                return Err(CoreError::invalid_argument(format!(
                    "payload of {size} bytes does not fit a {slot}-byte slot"
                )));
            }
            Some(slot) => slot,
            None => required,
        };
        Ok(Self {
            payload,
            total_size,
        })
    }

    /// Minimal span for a payload of `size` bytes.
    pub fn required_size(size: u32) -> CoreResult<u32> {
        size.max(Self::MIN_PAYLOAD)
            .checked_add(Self::HEADER_SIZE as u32)
            .ok_or_else(|| CoreError::invalid_argument("record payload exceeds 4 GiB"))
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Largest payload this span can hold.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.total_size - Self::HEADER_SIZE as u32
    }

    /// Encodes the entry to exactly `total_size` bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.total_size as usize];
        buf[0] = EntryType::Data.as_byte();
        buf[1..5].copy_from_slice(&self.size().to_be_bytes());
        buf[5..9].copy_from_slice(&self.total_size.to_be_bytes());
        buf[Self::HEADER_SIZE..Self::HEADER_SIZE + self.payload.len()]
            .copy_from_slice(&self.payload);
        buf
    }

    /// Reads `(size, total_size)` from the fixed prefix at `offset`.
    pub fn decode_frame(buf: &[u8], offset: usize) -> CoreResult<(u32, u32)> {
        if buf.get(offset) != Some(&EntryType::Data.as_byte()) {
            return Err(CoreError::corrupted("expected a data entry"));
        }
        let size = be_u32(buf, offset + 1)?;
        let total_size = be_u32(buf, offset + 5)?;
        if u64::from(size) + Self::HEADER_SIZE as u64 > u64::from(total_size) {
            return Err(CoreError::corrupted(format!(
                "data entry size {size} exceeds its span {total_size}"
            )));
        }
        Ok((size, total_size))
    }

    /// Decodes the entry at `offset`. Padding bytes need not be present.
    pub fn decode(buf: &[u8], offset: usize) -> CoreResult<Self> {
        let (size, total_size) = Self::decode_frame(buf, offset)?;
        let start = offset + Self::HEADER_SIZE;
        let payload = buf
            .get(start..start + size as usize)
            .ok_or_else(|| CoreError::corrupted("data entry payload truncated"))?
            .to_vec();
        Ok(Self {
            payload,
            total_size,
        })
    }
}
