//! Bucket tables and collision chains.

use super::hash::{bucket_index, hash_properties, prime_capacity};
use crate::cache::WriteKind;
use crate::entry::{
    BucketSlot, EntryType, FreeEntry, IndexHeader, BUCKET_SLOT_SIZE, INDEX_EXTRA_SIZE,
    INDEX_HEADER_SIZE,
};
use crate::error::{CoreError, CoreResult};
use crate::queue::Queue;
use crate::state::{now_millis, State};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// An open index: its header, location, queue and in-memory bucket table.
#[derive(Debug)]
pub(crate) struct IndexHandle {
    pub header: IndexHeader,
    /// Absolute offset of the index header.
    pub start: u64,
    /// Serializes this index's bucket mutations.
    pub queue: Queue,
    pub slots: Mutex<Vec<BucketSlot>>,
}

impl IndexHandle {
    fn new(header: IndexHeader, start: u64, slots: Vec<BucketSlot>) -> Self {
        Self {
            header,
            start,
            queue: Queue::new("index"),
            slots: Mutex::new(slots),
        }
    }

    pub fn key(&self) -> String {
        self.header.key()
    }

    /// Hash of `object` over this index's properties.
    pub fn hash_of(&self, object: &Value) -> u32 {
        hash_properties(&self.header.properties, object)
    }

    fn bucket_of(&self, hash: u32) -> usize {
        bucket_index(hash, self.header.bucket_count())
    }

    fn slot_offset(&self, bucket: usize) -> u64 {
        self.start + INDEX_HEADER_SIZE as u64 + (bucket * BUCKET_SLOT_SIZE) as u64
    }

    pub fn info(&self) -> IndexInfo {
        let slots = self.slots.lock();
        IndexInfo {
            properties: self.header.properties.clone(),
            start: self.start,
            buckets: slots.len(),
            occupied: slots.iter().filter(|s| !s.is_empty()).count(),
        }
    }
}

/// Public description of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    /// Indexed property names, sorted.
    pub properties: Vec<String>,
    /// Absolute offset of the index header.
    pub start: u64,
    /// Number of bucket slots.
    pub buckets: usize,
    /// Bucket slots holding a reference.
    pub occupied: usize,
}

impl State {
    pub fn find_index(&self, key: &str) -> Option<Arc<IndexHandle>> {
        self.indexes.iter().find(|i| i.key() == key).cloned()
    }

    /// Writes a zeroed index block at the end of the file and registers it.
    /// A fresh page follows the block when pages exist, so later appends
    /// never land behind it.
    pub fn append_index_block(
        &mut self,
        properties: Vec<String>,
        capacity: u64,
    ) -> CoreResult<Arc<IndexHandle>> {
        let buckets = prime_capacity(capacity.max(self.header.count));
        let bucket_bytes = buckets
            .checked_mul(BUCKET_SLOT_SIZE as u64)
            .filter(|b| {
                *b + (INDEX_HEADER_SIZE - FreeEntry::HEADER_SIZE) as u64 <= u64::from(u32::MAX)
            })
            .and_then(|b| u32::try_from(b).ok())
            .ok_or_else(|| {
                CoreError::invalid_argument(format!("index capacity {buckets} is too large"))
            })?;

        let header = IndexHeader::new(properties, bucket_bytes);
        let start = self.file_end;
        self.write(start, &header.encode()?, WriteKind::Metadata)?;
        self.write(
            start + INDEX_HEADER_SIZE as u64,
            &vec![0u8; bucket_bytes as usize],
            WriteKind::Metadata,
        )?;
        self.header.next_index = start;
        self.write_lists()?;

        if !self.pages.is_empty() {
            self.create_page(now_millis())?;
        }

        let handle = Arc::new(IndexHandle::new(
            header,
            start,
            vec![BucketSlot::default(); buckets as usize],
        ));
        self.indexes.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Hashes every live record into a freshly created index and saves the
    /// whole bucket table once.
    pub fn populate_index(&mut self, index: &IndexHandle) -> CoreResult<usize> {
        if self.header.count == 0 {
            return Ok(0);
        }
        let mut inserted = 0;
        let numbers: Vec<u32> = self.pages.iter().map(|p| p.number).collect();
        for number in numbers {
            let records = self.page_records(number)?;
            for record in records.iter() {
                let hash = index.hash_of(&record.value);
                let rel = self.relative(number, record.position)?;
                self.index_insert(index, hash, number, rel, false)?;
                inserted += 1;
            }
        }
        self.save_bucket_table(index)?;
        Ok(inserted)
    }

    fn save_bucket_table(&mut self, index: &IndexHandle) -> CoreResult<()> {
        let bytes: Vec<u8> = index
            .slots
            .lock()
            .iter()
            .flat_map(BucketSlot::encode_slot)
            .collect();
        self.write(index.start + INDEX_HEADER_SIZE as u64, &bytes, WriteKind::Metadata)
    }

    /// Points the bucket for `hash` at a record, pushing the previous
    /// occupant onto the collision chain.
    pub fn index_insert(
        &mut self,
        index: &IndexHandle,
        hash: u32,
        page: u32,
        position: u32,
        persist: bool,
    ) -> CoreResult<()> {
        let bucket = index.bucket_of(hash);
        let current = index.slots.lock()[bucket];
        let mut slot = BucketSlot {
            hash,
            position,
            page,
            next: 0,
            next_page: 0,
        };
        if !current.is_empty() {
            let (next_page, next) = self.append_to_last_page(&current.encode_extra())?;
            slot.next = next;
            slot.next_page = next_page;
            debug!(index = %index.key(), bucket, page = next_page, "extended collision chain");
        }
        index.slots.lock()[bucket] = slot;
        if persist {
            self.write(index.slot_offset(bucket), &slot.encode_slot(), WriteKind::Metadata)?;
        }
        Ok(())
    }

    /// Walks the chain for `hash` and returns the distinct `(page, absolute
    /// position)` pairs whose stored hash matches.
    pub fn index_candidates(&self, index: &IndexHandle, hash: u32) -> CoreResult<Vec<(u32, u64)>> {
        let mut current = index.slots.lock()[index.bucket_of(hash)];
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        loop {
            if !current.is_empty() && current.hash == hash {
                let position = self.page(current.page)?.start + u64::from(current.position);
                if seen.insert((current.page, position)) {
                    candidates.push((current.page, position));
                }
            }
            if current.next_page == 0 {
                break;
            }
            if !visited.insert((current.next_page, current.next)) {
                return Err(CoreError::corrupted(format!(
                    "collision chain of index '{}' loops",
                    index.key()
                )));
            }
            let at = self.page(current.next_page)?.start + u64::from(current.next);
            current = BucketSlot::decode_extra(&self.read(at, INDEX_EXTRA_SIZE)?, 0)?;
        }
        Ok(candidates)
    }

    /// Marks the index block free and forgets the index. The block is not
    /// linked into the free list and its collision chain stays where it is.
    pub fn drop_index(&mut self, index: &IndexHandle) -> CoreResult<()> {
        let entry = FreeEntry::covering(index.header.block_size(), 0)?;
        self.write(index.start, &entry.encode(), WriteKind::Metadata)?;
        self.indexes.retain(|i| i.start != index.start);
        if self.header.next_index == index.start {
            self.header.next_index = self.indexes.last().map_or(0, |i| i.start);
            self.write_lists()?;
        }
        Ok(())
    }

    /// Finds index blocks in the byte ranges outside every page.
    pub(crate) fn discover_indexes(&mut self) -> CoreResult<()> {
        let mut gaps = Vec::new();
        let mut cursor = crate::entry::HEADER_SIZE as u64;
        for page in &self.pages {
            gaps.push((cursor, page.start));
            cursor = page.end;
        }
        gaps.push((cursor, self.file_end));

        self.indexes.clear();
        for (mut at, end) in gaps {
            while at < end {
                let tag = self.read(at, 1)?[0];
                match EntryType::from_byte(tag) {
                    Some(EntryType::Index) => {
                        let header = IndexHeader::decode(&self.read(at, INDEX_HEADER_SIZE)?, 0)?;
                        let table = self.read(
                            at + INDEX_HEADER_SIZE as u64,
                            header.bucket_bytes as usize,
                        )?;
                        let slots = (0..header.bucket_count())
                            .map(|i| BucketSlot::decode_slot(&table, i * BUCKET_SLOT_SIZE))
                            .collect::<CoreResult<Vec<_>>>()?;
                        let size = header.block_size();
                        self.indexes
                            .push(Arc::new(IndexHandle::new(header, at, slots)));
                        at += size;
                    }
                    Some(EntryType::Free) => {
                        at += FreeEntry::decode(&self.read(at, FreeEntry::HEADER_SIZE)?, 0)?
                            .total_size();
                    }
                    _ => {
                        return Err(CoreError::corrupted(format!(
                            "unexpected entry type {tag} outside pages at {at}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
