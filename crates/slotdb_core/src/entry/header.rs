//! The 72-byte file header.

use super::{be_u32, be_u64, get_name, put_name};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use serde::Serialize;

/// Encoded size of the header.
pub const HEADER_SIZE: usize = 72;

/// Format version written to and required from every file.
pub const FORMAT_VERSION: [u8; 3] = [0, 0, 1];

const CHARSET_RANGE: std::ops::Range<usize> = 3..19;

/// The singleton header at offset 0.
///
/// Layout: `version(3) · charset(16) · nextFree(u64) · count(u64) ·
/// spaceUsed(u64) · inMemoryPages(u8) · pageSize(u32) · nextIndex(u64) ·
/// nextPage(u64) · nextSequence(u64)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    /// Format version.
    pub version: [u8; 3],
    /// Charset name.
    pub charset: String,
    /// Head of the free list, 0 when empty.
    pub next_free: u64,
    /// Live data entries in the file.
    pub count: u64,
    /// Sum of live data payload sizes.
    pub space_used: u64,
    /// Page cache capacity.
    pub in_memory_pages: u8,
    /// Maximum live data entries per page.
    pub page_size: u32,
    /// Most recently created index block, 0 when none.
    pub next_index: u64,
    /// First page descriptor, 0 when there are no pages.
    pub next_page: u64,
    /// Head of the sequence list, 0 when empty.
    pub next_sequence: u64,
}

impl Header {
    /// Offset of the 24-byte counters block (`nextFree`, `count`, `spaceUsed`).
    pub const COUNTERS_OFFSET: u64 = 19;

    /// Offset of the 24-byte list heads block (`nextIndex`, `nextPage`, `nextSequence`).
    pub const LISTS_OFFSET: u64 = 48;

    /// A header for a brand new file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the charset name exceeds 16 bytes or the
    /// page size is zero.
    pub fn new(config: &Config) -> CoreResult<Self> {
        if config.charset.len() > CHARSET_RANGE.len() {
            return Err(CoreError::invalid_argument(format!(
                "charset name '{}' is longer than 16 bytes",
                config.charset
            )));
        }
        if config.page_size == 0 {
            return Err(CoreError::invalid_argument("page size must be at least 1"));
        }
        Ok(Self {
            version: FORMAT_VERSION,
            charset: config.charset.clone(),
            next_free: 0,
            count: 0,
            space_used: 0,
            in_memory_pages: config.in_memory_pages,
            page_size: config.page_size,
            next_index: 0,
            next_page: 0,
            next_sequence: 0,
        })
    }

    /// Encodes the full header.
    pub fn encode(&self) -> CoreResult<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..3].copy_from_slice(&self.version);
        put_name(&mut buf[CHARSET_RANGE], &self.charset)?;
        buf[19..43].copy_from_slice(&self.counters());
        buf[43] = self.in_memory_pages;
        buf[44..48].copy_from_slice(&self.page_size.to_be_bytes());
        buf[48..72].copy_from_slice(&self.lists());
        Ok(buf)
    }

    /// The counters block, written whenever a counter changes.
    #[must_use]
    pub fn counters(&self) -> [u8; 24] {
        let mut buf = [0u8; 24];
        buf[..8].copy_from_slice(&self.next_free.to_be_bytes());
        buf[8..16].copy_from_slice(&self.count.to_be_bytes());
        buf[16..].copy_from_slice(&self.space_used.to_be_bytes());
        buf
    }

    /// The list heads block, written whenever a list head moves.
    #[must_use]
    pub fn lists(&self) -> [u8; 24] {
        let mut buf = [0u8; 24];
        buf[..8].copy_from_slice(&self.next_index.to_be_bytes());
        buf[8..16].copy_from_slice(&self.next_page.to_be_bytes());
        buf[16..].copy_from_slice(&self.next_sequence.to_be_bytes());
        buf
    }

    /// Decodes and validates a header.
    ///
    /// # Errors
    ///
    /// Returns `FormatIncompatible` if the buffer is shorter than the header
    /// or the stored version differs from [`FORMAT_VERSION`].
    pub fn decode(buf: &[u8]) -> CoreResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CoreError::format_incompatible(format!(
                "file holds {} bytes, the header alone needs {HEADER_SIZE}",
                buf.len()
            )));
        }
        let version = [buf[0], buf[1], buf[2]];
        if version != FORMAT_VERSION {
            return Err(CoreError::format_incompatible(format!(
                "file version v{}.{}.{} is not compatible with v{}.{}.{}",
                version[0], version[1], version[2], FORMAT_VERSION[0], FORMAT_VERSION[1],
                FORMAT_VERSION[2]
            )));
        }
        Ok(Self {
            version,
            charset: get_name(&buf[CHARSET_RANGE])?,
            next_free: be_u64(buf, 19)?,
            count: be_u64(buf, 27)?,
            space_used: be_u64(buf, 35)?,
            in_memory_pages: buf[43],
            page_size: be_u32(buf, 44)?,
            next_index: be_u64(buf, 48)?,
            next_page: be_u64(buf, 56)?,
            next_sequence: be_u64(buf, 64)?,
        })
    }
}
