//! The engine context owned by an open store.
//!
//! Everything the engine knows about the open file lives here: the backend,
//! the header, the page list, the page cache, sequences and indexes. It is
//! only ever touched under the store's state lock, and all I/O it performs
//! is synchronous.

use crate::cache::{rank, PageCache, Record, WriteKind};
use crate::config::Config;
use crate::entry::{
    entry_span, DataEntry, EntryType, Header, Page, SequenceEntry, HEADER_SIZE, PAGE_ENTRY_SIZE,
    SEQUENCE_ENTRY_SIZE,
};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexHandle;
use crate::stats::StoreStats;
use slotdb_storage::StorageBackend;
use std::sync::Arc;
use tracing::{debug, info};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

pub(crate) struct State {
    /// Taken when the store closes, which releases the file and its lock.
    backend: Option<Box<dyn StorageBackend>>,
    /// Logical end of file; every append lands here.
    pub file_end: u64,
    pub header: Header,
    /// Indexed by page number - 1. Sorted by `start` as well.
    pub pages: Vec<Page>,
    pub cache: PageCache,
    /// In list order: most recently created first.
    pub sequences: Vec<SequenceEntry>,
    /// In creation order.
    pub indexes: Vec<Arc<IndexHandle>>,
    pub stats: Arc<StoreStats>,
}

impl State {
    pub fn new(
        backend: Box<dyn StorageBackend>,
        config: &Config,
        stats: Arc<StoreStats>,
    ) -> CoreResult<Self> {
        Ok(Self {
            backend: Some(backend),
            file_end: 0,
            header: Header::new(config)?,
            pages: Vec::new(),
            cache: PageCache::new(),
            sequences: Vec::new(),
            indexes: Vec::new(),
            stats,
        })
    }

    /// Reads the header, pages, sequences and indexes, or initializes an
    /// empty file.
    pub fn load(&mut self, config: &Config) -> CoreResult<()> {
        let size = self.backend()?.size()?;
        if size == 0 {
            if !config.create_if_missing {
                return Err(CoreError::format_incompatible("file is empty"));
            }
            self.header = Header::new(config)?;
            let bytes = self.header.encode()?;
            self.write(0, &bytes, WriteKind::Metadata)?;
            self.file_end = HEADER_SIZE as u64;
            info!(
                page_size = self.header.page_size,
                in_memory_pages = self.header.in_memory_pages,
                "created new store"
            );
            return Ok(());
        }
        if size < HEADER_SIZE as u64 {
            return Err(CoreError::format_incompatible(format!(
                "file holds {size} bytes, the header alone needs {HEADER_SIZE}"
            )));
        }

        self.file_end = size;
        self.header = Header::decode(&self.read(0, HEADER_SIZE)?)?;
        self.load_pages()?;
        self.load_sequences()?;
        self.discover_indexes()?;
        self.rebalance_cache()?;

        info!(
            pages = self.pages.len(),
            records = self.header.count,
            sequences = self.sequences.len(),
            indexes = self.indexes.len(),
            "opened store"
        );
        Ok(())
    }

    fn load_pages(&mut self) -> CoreResult<()> {
        self.pages.clear();
        let mut next = self.header.next_page;
        while next != 0 {
            if next < HEADER_SIZE as u64 || next + PAGE_ENTRY_SIZE as u64 > self.file_end {
                return Err(CoreError::corrupted(format!("page pointer {next} is out of range")));
            }
            let page = Page::decode(&self.read(next, PAGE_ENTRY_SIZE)?, 0, next)?;
            let expected = self.pages.len() as u32 + 1;
            if page.number != expected {
                return Err(CoreError::corrupted(format!(
                    "page at {next} is numbered {}, expected {expected}",
                    page.number
                )));
            }
            if page.end > self.file_end {
                return Err(CoreError::corrupted(format!(
                    "page {} ends at {} past end of file {}",
                    page.number, page.end, self.file_end
                )));
            }
            if let Some(prev) = self.pages.last() {
                if page.start < prev.end {
                    return Err(CoreError::corrupted(format!(
                        "page {} overlaps page {}",
                        page.number, prev.number
                    )));
                }
            }
            next = page.next;
            self.pages.push(page);
        }
        Ok(())
    }

    fn load_sequences(&mut self) -> CoreResult<()> {
        self.sequences.clear();
        let mut next = self.header.next_sequence;
        let limit = self.file_end / SEQUENCE_ENTRY_SIZE as u64;
        while next != 0 {
            if self.sequences.len() as u64 > limit {
                return Err(CoreError::corrupted("sequence list does not terminate"));
            }
            let sequence = SequenceEntry::decode(&self.read(next, SEQUENCE_ENTRY_SIZE)?, 0, next)?;
            next = sequence.next;
            self.sequences.push(sequence);
        }
        Ok(())
    }

    pub fn backend(&self) -> CoreResult<&dyn StorageBackend> {
        self.backend.as_deref().ok_or(CoreError::Closed)
    }

    pub fn backend_mut(&mut self) -> CoreResult<&mut (dyn StorageBackend + 'static)> {
        self.backend.as_deref_mut().ok_or(CoreError::Closed)
    }

    /// Flushes the backend and drops it. Later I/O fails with `Closed`.
    pub fn release(&mut self, sync: bool) -> CoreResult<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        self.cache.clear();
        backend.flush()?;
        if sync {
            backend.sync()?;
        }
        Ok(())
    }

    /// Reads `len` bytes at `position`, from the page cache when resident.
    pub fn read(&self, position: u64, len: usize) -> CoreResult<Vec<u8>> {
        if let Some(number) = self.page_at(position) {
            let page = &self.pages[number as usize - 1];
            if let Some(bytes) = self.cache.bytes(number) {
                let rel = (position - page.start) as usize;
                if let Some(slice) = bytes.get(rel..rel + len) {
                    return Ok(slice.to_vec());
                }
            }
        }
        let bytes = self.backend()?.read_at(position, len)?;
        self.stats.record_read(len as u64);
        Ok(bytes)
    }

    /// Writes `data` at `position` and mirrors it into the page cache.
    pub fn write(&mut self, position: u64, data: &[u8], kind: WriteKind) -> CoreResult<()> {
        self.backend_mut()?.write_at(position, data)?;
        self.stats.record_write(data.len() as u64);
        self.file_end = self.file_end.max(position + data.len() as u64);
        if let Some(number) = self.page_at(position) {
            let page = self.pages[number as usize - 1];
            self.cache.apply_write(&page, position, data, kind);
        }
        Ok(())
    }

    pub fn write_counters(&mut self) -> CoreResult<()> {
        let bytes = self.header.counters();
        self.write(Header::COUNTERS_OFFSET, &bytes, WriteKind::Metadata)
    }

    pub fn write_lists(&mut self) -> CoreResult<()> {
        let bytes = self.header.lists();
        self.write(Header::LISTS_OFFSET, &bytes, WriteKind::Metadata)
    }

    pub fn write_page_count_and_end(&mut self, number: u32) -> CoreResult<()> {
        let page = *self.page(number)?;
        self.write(
            page.start + Page::COUNT_OFFSET,
            &page.count_and_end(),
            WriteKind::Metadata,
        )
    }

    /// Stamps the page as used now and persists the stamp.
    pub fn touch_page(&mut self, number: u32) -> CoreResult<()> {
        let now = now_millis();
        let page = self.page_mut(number)?;
        page.uses = now;
        let start = page.start;
        self.write(start + Page::USES_OFFSET, &now.to_be_bytes(), WriteKind::Metadata)
    }

    pub fn page(&self, number: u32) -> CoreResult<&Page> {
        number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .ok_or_else(|| CoreError::corrupted(format!("reference to missing page {number}")))
    }

    pub fn page_mut(&mut self, number: u32) -> CoreResult<&mut Page> {
        number
            .checked_sub(1)
            .and_then(|i| self.pages.get_mut(i as usize))
            .ok_or_else(|| CoreError::corrupted(format!("reference to missing page {number}")))
    }

    pub fn last_page(&self) -> Option<&Page> {
        self.pages.last()
    }

    /// The number of the page whose range contains `position`.
    pub fn page_at(&self, position: u64) -> Option<u32> {
        let idx = self.pages.partition_point(|p| p.start <= position);
        let page = self.pages.get(idx.checked_sub(1)?)?;
        page.contains(position).then_some(page.number)
    }

    /// Page-relative offset of `position` inside page `number`, as stored in
    /// index buckets.
    pub fn relative(&self, number: u32, position: u64) -> CoreResult<u32> {
        let page = self.page(number)?;
        u32::try_from(position - page.start)
            .map_err(|_| {
                CoreError::invalid_argument("page grew past the 4 GiB an index can address")
            })
    }

    /// Bytes of page `number`, from the cache or read through.
    pub fn page_bytes(&self, number: u32) -> CoreResult<Vec<u8>> {
        if let Some(bytes) = self.cache.bytes(number) {
            return Ok(bytes.to_vec());
        }
        let page = self.page(number)?;
        let bytes = self.backend()?.read_at(page.start, (page.end - page.start) as usize)?;
        self.stats.record_read(bytes.len() as u64);
        Ok(bytes)
    }

    /// The live data records of page `number`, in on-disk order.
    pub fn page_records(&mut self, number: u32) -> CoreResult<Arc<Vec<Arc<Record>>>> {
        if let Some(entries) = self.cache.entries(number) {
            return Ok(entries);
        }
        let page = *self.page(number)?;
        let mut records = Vec::with_capacity(page.count as usize);
        if page.count > 0 {
            let bytes = self.page_bytes(number)?;
            let mut rel = PAGE_ENTRY_SIZE;
            while rel < bytes.len() && records.len() < page.count as usize {
                let (kind, span) = entry_span(&bytes, rel)?;
                let span = span as usize;
                if rel + span > bytes.len() {
                    return Err(CoreError::corrupted(format!(
                        "entry at {} runs past the end of page {}",
                        page.start + rel as u64,
                        page.number
                    )));
                }
                if kind == EntryType::Data {
                    let position = page.start + rel as u64;
                    let record = match self.cache.record_at(number, position) {
                        Some(record) => record,
                        None => Arc::new(decode_record(&bytes, rel, position)?),
                    };
                    records.push(record);
                }
                rel += span;
            }
        }
        let records = Arc::new(records);
        self.cache.set_entries(number, Arc::clone(&records));
        Ok(records)
    }

    /// The data record at `position` in page `number`, or `None` if
    /// something else lives there now.
    pub fn record_at(&mut self, number: u32, position: u64) -> CoreResult<Option<Arc<Record>>> {
        if let Some(record) = self.cache.record_at(number, position) {
            return Ok(Some(record));
        }
        let page = self.page(number)?;
        if !page.contains(position) || position + DataEntry::HEADER_SIZE as u64 > page.end {
            return Ok(None);
        }
        let prefix = self.read(position, DataEntry::HEADER_SIZE)?;
        if prefix[0] != EntryType::Data.as_byte() {
            return Ok(None);
        }
        let (size, _) = DataEntry::decode_frame(&prefix, 0)?;
        let bytes = self.read(position, DataEntry::HEADER_SIZE + size as usize)?;
        let record = Arc::new(decode_record(&bytes, 0, position)?);
        self.cache.remember(number, Arc::clone(&record));
        Ok(Some(record))
    }

    pub fn ranked_pages(&self) -> Vec<u32> {
        rank(&self.pages)
    }

    /// Loads the best-ranked pages and evicts the rest.
    pub fn rebalance_cache(&mut self) -> CoreResult<()> {
        let ranked = rank(&self.pages);
        let (load, evict) = self
            .cache
            .plan(&ranked, usize::from(self.header.in_memory_pages));
        for number in evict {
            if self.cache.is_resident(number) {
                self.stats.record_page_evicted();
                debug!(page = number, "evicted page");
            }
            self.cache.evict(number);
        }
        for number in load {
            let page = *self.page(number)?;
            let bytes = self
                .backend()?
                .read_at(page.start, (page.end - page.start) as usize)?;
            self.stats.record_read(bytes.len() as u64);
            self.stats.record_page_loaded();
            self.cache.insert(number, bytes);
            debug!(page = number, "loaded page");
        }
        Ok(())
    }
}

fn decode_record(buf: &[u8], offset: usize, position: u64) -> CoreResult<Record> {
    let entry = DataEntry::decode(buf, offset)?;
    let value = serde_json::from_slice(&entry.payload).map_err(|e| {
        CoreError::corrupted(format!("record at {position} is not valid JSON: {e}"))
    })?;
    Ok(Record {
        position,
        size: entry.size(),
        total_size: entry.total_size,
        value,
    })
}
