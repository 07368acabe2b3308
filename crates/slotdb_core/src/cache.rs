//! Page cache.
//!
//! Keeps the raw bytes of the best-ranked pages resident, plus two decode
//! caches per page: the ordered list of data records found by the last full
//! scan, and a map from page-relative offset to decoded record filled by
//! index lookups. Decode caches are dropped whenever record bytes in the
//! page change and whenever the page falls out of the resident set.

use crate::entry::Page;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

/// A decoded data entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Record {
    /// Absolute offset of the entry.
    pub position: u64,
    /// Payload length.
    pub size: u32,
    /// On-disk span, slack included.
    pub total_size: u32,
    /// Parsed payload.
    pub value: Value,
}

impl Record {
    /// Largest payload the slot can take without moving.
    pub fn capacity(&self) -> u64 {
        u64::from(self.total_size) - crate::entry::DataEntry::HEADER_SIZE as u64
    }
}

/// Whether a write changed record layout or only descriptor fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    /// Data entries were written, moved or freed.
    Records,
    /// Page descriptors, list links or counters changed.
    Metadata,
}

#[derive(Debug, Default)]
struct Decoded {
    entries: Option<Arc<Vec<Arc<Record>>>>,
    positions: HashMap<u64, Arc<Record>>,
}

/// Orders page numbers by most recent use, newest page first on ties.
pub(crate) fn rank(pages: &[Page]) -> Vec<u32> {
    let mut ranked: Vec<&Page> = pages.iter().collect();
    ranked.sort_by_key(|p| (Reverse(p.uses), Reverse(p.number)));
    ranked.into_iter().map(|p| p.number).collect()
}

/// Resident page bytes and decode caches.
#[derive(Debug, Default)]
pub(crate) struct PageCache {
    resident: HashMap<u32, Vec<u8>>,
    decoded: HashMap<u32, Decoded>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resident(&self, number: u32) -> bool {
        self.resident.contains_key(&number)
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    pub fn bytes(&self, number: u32) -> Option<&[u8]> {
        self.resident.get(&number).map(Vec::as_slice)
    }

    pub fn insert(&mut self, number: u32, bytes: Vec<u8>) {
        self.resident.insert(number, bytes);
    }

    /// Drops the page's bytes and decode caches.
    pub fn evict(&mut self, number: u32) {
        self.resident.remove(&number);
        self.decoded.remove(&number);
    }

    pub fn clear(&mut self) {
        self.resident.clear();
        self.decoded.clear();
    }

    pub fn entries(&self, number: u32) -> Option<Arc<Vec<Arc<Record>>>> {
        self.decoded.get(&number).and_then(|d| d.entries.clone())
    }

    pub fn set_entries(&mut self, number: u32, entries: Arc<Vec<Arc<Record>>>) {
        let decoded = self.decoded.entry(number).or_default();
        for record in entries.iter() {
            decoded
                .positions
                .entry(record.position)
                .or_insert_with(|| Arc::clone(record));
        }
        decoded.entries = Some(entries);
    }

    pub fn record_at(&self, number: u32, position: u64) -> Option<Arc<Record>> {
        self.decoded
            .get(&number)
            .and_then(|d| d.positions.get(&position).cloned())
    }

    pub fn remember(&mut self, number: u32, record: Arc<Record>) {
        self.decoded
            .entry(number)
            .or_default()
            .positions
            .insert(record.position, record);
    }

    /// Mirrors a write into the resident copy of `page`.
    ///
    /// `position` must lie inside the page. A record write also drops the
    /// page's decode caches.
    pub fn apply_write(&mut self, page: &Page, position: u64, data: &[u8], kind: WriteKind) {
        if kind == WriteKind::Records {
            self.decoded.remove(&page.number);
        }
        let Some(bytes) = self.resident.get_mut(&page.number) else {
            return;
        };
        let rel = (position - page.start) as usize;
        let end = rel + data.len();
        if end <= bytes.len() {
            bytes[rel..end].copy_from_slice(data);
        } else if rel <= bytes.len() {
            bytes.truncate(rel);
            bytes.extend_from_slice(data);
        } else {
            self.resident.remove(&page.number);
        }
    }

    /// Works out which pages to load and which to drop so that exactly the
    /// first `capacity` pages of `ranked` are resident.
    pub fn plan(&self, ranked: &[u32], capacity: usize) -> (Vec<u32>, Vec<u32>) {
        let keep = &ranked[..capacity.min(ranked.len())];
        let load = keep
            .iter()
            .copied()
            .filter(|n| !self.resident.contains_key(n))
            .collect();
        let mut evict: Vec<u32> = self
            .resident
            .keys()
            .chain(self.decoded.keys())
            .copied()
            .filter(|n| !keep.contains(n))
            .collect();
        evict.sort_unstable();
        evict.dedup();
        (load, evict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(number: u32, start: u64, uses: u64) -> Page {
        Page {
            start,
            number,
            count: 0,
            end: start + 33,
            next: 0,
            uses,
        }
    }

    fn record(position: u64) -> Arc<Record> {
        Arc::new(Record {
            position,
            size: 2,
            total_size: 13,
            value: json!({}),
        })
    }

    #[test]
    fn rank_by_uses_then_newest() {
        let pages = vec![page(1, 72, 10), page(2, 200, 30), page(3, 400, 10), page(4, 600, 5)];
        assert_eq!(rank(&pages), vec![2, 3, 1, 4]);
    }

    #[test]
    fn plan_loads_top_and_evicts_rest() {
        let mut cache = PageCache::new();
        cache.insert(1, vec![0; 33]);
        cache.insert(4, vec![0; 33]);
        cache.set_entries(3, Arc::new(vec![record(500)]));

        let (load, evict) = cache.plan(&[2, 1, 3, 4], 2);
        assert_eq!(load, vec![2]);
        assert_eq!(evict, vec![3, 4]);
    }

    #[test]
    fn capacity_beyond_page_count() {
        let cache = PageCache::new();
        let (load, evict) = cache.plan(&[1, 2], 100);
        assert_eq!(load, vec![1, 2]);
        assert!(evict.is_empty());
    }

    #[test]
    fn record_write_drops_decode_caches() {
        let p = page(1, 100, 0);
        let mut cache = PageCache::new();
        cache.insert(1, vec![0; 40]);
        cache.set_entries(1, Arc::new(vec![record(133)]));

        cache.apply_write(&p, 125, &[1, 2, 3, 4, 5, 6, 7, 8], WriteKind::Metadata);
        assert!(cache.entries(1).is_some());
        assert_eq!(&cache.bytes(1).unwrap()[25..33], &[1, 2, 3, 4, 5, 6, 7, 8]);

        cache.apply_write(&p, 133, &[9; 4], WriteKind::Records);
        assert!(cache.entries(1).is_none());
        assert!(cache.record_at(1, 133).is_none());
        assert_eq!(&cache.bytes(1).unwrap()[33..37], &[9; 4]);
    }

    #[test]
    fn append_extends_resident_bytes() {
        let p = page(1, 100, 0);
        let mut cache = PageCache::new();
        cache.insert(1, vec![0; 33]);
        cache.apply_write(&p, 133, &[7; 13], WriteKind::Records);
        assert_eq!(cache.bytes(1).unwrap().len(), 46);
    }

    #[test]
    fn positions_survive_until_eviction() {
        let mut cache = PageCache::new();
        cache.remember(2, record(300));
        assert!(cache.record_at(2, 300).is_some());
        cache.evict(2);
        assert!(cache.record_at(2, 300).is_none());
    }
}
