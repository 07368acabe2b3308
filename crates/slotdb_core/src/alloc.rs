//! Free-space allocator.
//!
//! Placement is first fit over the free list, falling back to an append at
//! the end of the last page. Freed spans are pushed onto the head of the
//! list. A reused slot is consumed whole; its slack is kept in the data
//! entry's `totalSize` rather than split off.

use crate::cache::{Record, WriteKind};
use crate::entry::{DataEntry, FreeEntry, Page};
use crate::error::{CoreError, CoreResult};
use crate::state::{now_millis, State};
use std::collections::HashSet;
use tracing::debug;

/// What kind of slot a placement is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fit {
    /// A data entry with this payload length. Any slot with enough capacity
    /// on a page below its record limit will do.
    Data { payload: u32 },
    /// A fixed-size entry spanning exactly `total` bytes.
    Exact { total: u64 },
}

/// Where an entry is going to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    /// Owning page.
    pub page: u32,
    /// Absolute offset.
    pub position: u64,
    /// Total span of the reused free slot; `None` for an append.
    pub slot: Option<u64>,
}

/// A free list entry that satisfied a [`Fit`].
#[derive(Debug, Clone, Copy)]
struct FreeHit {
    position: u64,
    predecessor: Option<u64>,
    entry: FreeEntry,
    page: u32,
}

impl State {
    fn find_free(&self, fit: Fit) -> CoreResult<Option<FreeHit>> {
        let mut predecessor = None;
        let mut next = self.header.next_free;
        let mut seen = HashSet::new();
        while next != 0 {
            if !seen.insert(next) {
                return Err(CoreError::corrupted(format!("free list loops back to {next}")));
            }
            let page = self.page_at(next).ok_or_else(|| {
                CoreError::corrupted(format!("free entry at {next} lies outside every page"))
            })?;
            let entry = FreeEntry::decode(&self.read(next, FreeEntry::HEADER_SIZE)?, 0)?;
            let accepted = match fit {
                Fit::Data { payload } => {
                    let need = u64::from(payload.max(DataEntry::MIN_PAYLOAD));
                    entry.data_capacity() >= need
                        && u32::try_from(entry.total_size()).is_ok()
                        && self.page(page)?.count < self.header.page_size
                }
                Fit::Exact { total } => entry.total_size() == total,
            };
            if accepted {
                return Ok(Some(FreeHit {
                    position: next,
                    predecessor,
                    entry,
                    page,
                }));
            }
            predecessor = Some(next);
            next = entry.next;
        }
        Ok(None)
    }

    /// Whether appending for `fit` needs a fresh page first.
    fn needs_page(&self, fit: Fit) -> bool {
        match (self.last_page(), fit) {
            (None, _) => true,
            (Some(last), Fit::Data { .. }) => last.count >= self.header.page_size,
            (Some(_), Fit::Exact { .. }) => false,
        }
    }

    /// Appends a new, empty page at the end of the file and links it in.
    pub fn create_page(&mut self, uses: u64) -> CoreResult<u32> {
        let number = u32::try_from(self.pages.len() + 1)
            .map_err(|_| CoreError::invalid_argument("page numbers exhausted"))?;
        let page = Page::new(number, self.file_end, uses);
        self.write(page.start, &page.encode(), WriteKind::Metadata)?;

        match self.pages.last_mut() {
            Some(last) => {
                last.next = page.start;
                let at = last.start + Page::NEXT_OFFSET;
                self.write(at, &page.start.to_be_bytes(), WriteKind::Metadata)?;
            }
            None => {
                self.header.next_page = page.start;
                self.write_lists()?;
            }
        }
        self.pages.push(page);
        debug!(page = number, start = page.start, "created page");
        Ok(number)
    }

    /// Resolves a position for `fit`, unlinking a reused free slot.
    ///
    /// An append placement does not move the page end; [`State::write_entry`]
    /// does that once the bytes are down.
    pub fn place(&mut self, fit: Fit) -> CoreResult<Placement> {
        if let Some(hit) = self.find_free(fit)? {
            match hit.predecessor {
                Some(prev) => {
                    let at = prev + FreeEntry::NEXT_OFFSET;
                    self.write(at, &hit.entry.next.to_be_bytes(), WriteKind::Metadata)?;
                }
                None => {
                    self.header.next_free = hit.entry.next;
                    self.write_counters()?;
                }
            }
            debug!(position = hit.position, size = hit.entry.total_size(), "reusing free slot");
            return Ok(Placement {
                page: hit.page,
                position: hit.position,
                slot: Some(hit.entry.total_size()),
            });
        }

        if self.needs_page(fit) {
            self.create_page(now_millis())?;
        }
        let last = self
            .last_page()
            .ok_or_else(|| CoreError::corrupted("no page to append to"))?;
        Ok(Placement {
            page: last.number,
            position: last.end,
            slot: None,
        })
    }

    /// Writes `bytes` at a placement, growing the page for appends and
    /// counting a new data record when `is_record` is set.
    pub fn write_entry(
        &mut self,
        placement: Placement,
        bytes: &[u8],
        is_record: bool,
    ) -> CoreResult<()> {
        // Grow the page first so the write is mirrored into its cached bytes.
        let page = self.page_mut(placement.page)?;
        let appended = placement.slot.is_none();
        if appended {
            page.end = page.end.max(placement.position + bytes.len() as u64);
        }
        if is_record {
            page.count += 1;
        }
        self.write(placement.position, bytes, WriteKind::Records)?;
        if appended || is_record {
            self.write_page_count_and_end(placement.page)?;
        }
        Ok(())
    }

    /// Appends raw bytes at the end of the last page without touching its
    /// record count. Returns the page and the page-relative offset.
    pub fn append_to_last_page(&mut self, bytes: &[u8]) -> CoreResult<(u32, u32)> {
        let last = *self
            .last_page()
            .ok_or_else(|| CoreError::corrupted("no page to append to"))?;
        let rel = self.relative(last.number, last.end)?;
        let placement = Placement {
            page: last.number,
            position: last.end,
            slot: None,
        };
        self.write_entry(placement, bytes, false)?;
        Ok((last.number, rel))
    }

    /// Turns `total` bytes at `position` into a free entry at the head of
    /// the free list. The caller persists the header counters.
    pub fn free_span(&mut self, position: u64, total: u64) -> CoreResult<()> {
        let entry = FreeEntry::covering(total, self.header.next_free)?;
        self.write(position, &entry.encode(), WriteKind::Records)?;
        self.header.next_free = position;
        Ok(())
    }

    /// Stores a new data record and returns its placement and total size.
    pub fn insert_record(&mut self, payload: Vec<u8>) -> CoreResult<(Placement, u32)> {
        let size = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_argument("record exceeds 4 GiB"))?;
        let placement = self.place(Fit::Data { payload: size })?;
        let slot = placement
            .slot
            .map(|total| {
                u32::try_from(total)
                    .map_err(|_| CoreError::corrupted("free slot larger than a data entry"))
            })
            .transpose()?;
        let entry = DataEntry::new(payload, slot)?;
        self.write_entry(placement, &entry.encode(), true)?;

        self.header.count += 1;
        self.header.space_used += u64::from(size);
        self.write_counters()?;
        Ok((placement, entry.total_size))
    }

    /// Frees a live record's whole span.
    pub fn remove_record(&mut self, page: u32, record: &Record) -> CoreResult<()> {
        self.free_span(record.position, u64::from(record.total_size))?;
        let owner = self.page_mut(page)?;
        owner.count = owner.count.saturating_sub(1);
        self.write_page_count_and_end(page)?;

        self.header.count = self.header.count.saturating_sub(1);
        self.header.space_used = self.header.space_used.saturating_sub(u64::from(record.size));
        self.write_counters()
    }

    /// Overwrites a record whose slot can hold `payload`.
    pub fn rewrite_in_place(&mut self, record: &Record, payload: Vec<u8>) -> CoreResult<()> {
        let entry = DataEntry::new(payload, Some(record.total_size))?;
        self.write(record.position, &entry.encode(), WriteKind::Records)?;
        self.header.space_used =
            self.header.space_used.saturating_sub(u64::from(record.size)) + u64::from(entry.size());
        self.write_counters()
    }

    /// Moves a record that outgrew its slot: the new copy is placed first,
    /// then the old span is freed.
    pub fn relocate(
        &mut self,
        page: u32,
        record: &Record,
        payload: Vec<u8>,
    ) -> CoreResult<Placement> {
        let (placement, _) = self.insert_record(payload)?;
        self.remove_record(page, record)?;
        Ok(placement)
    }

    /// Positions on the free list, head first.
    pub fn free_list(&self) -> CoreResult<Vec<u64>> {
        let mut positions = Vec::new();
        let mut seen = HashSet::new();
        let mut next = self.header.next_free;
        while next != 0 {
            if !seen.insert(next) {
                return Err(CoreError::corrupted(format!("free list loops back to {next}")));
            }
            positions.push(next);
            next = FreeEntry::decode(&self.read(next, FreeEntry::HEADER_SIZE)?, 0)?.next;
        }
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::stats::StoreStats;
    use serde_json::json;
    use slotdb_storage::InMemoryBackend;
    use std::sync::Arc;

    fn state(page_size: u32) -> State {
        let config = Config::default().page_size(page_size);
        let mut state = State::new(
            Box::new(InMemoryBackend::new()),
            &config,
            Arc::new(StoreStats::new()),
        )
        .unwrap();
        state.load(&config).unwrap();
        state
    }

    fn insert(state: &mut State, value: serde_json::Value) -> Placement {
        state
            .insert_record(serde_json::to_vec(&value).unwrap())
            .unwrap()
            .0
    }

    fn record(state: &mut State, placement: Placement) -> Arc<Record> {
        state
            .record_at(placement.page, placement.position)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn first_insert_creates_page_and_appends() {
        let mut state = state(10);
        let placement = insert(&mut state, json!({"a": 1}));
        assert_eq!(state.pages.len(), 1);
        assert_eq!(placement.position, 72 + 33);
        assert_eq!(placement.slot, None);
        assert_eq!(state.pages[0].count, 1);
        assert_eq!(state.header.count, 1);
    }

    #[test]
    fn full_page_rolls_over() {
        let mut state = state(2);
        insert(&mut state, json!(1));
        insert(&mut state, json!(2));
        let third = insert(&mut state, json!(3));
        assert_eq!(third.page, 2);
        assert_eq!(state.pages[0].next, state.pages[1].start);
    }

    #[test]
    fn freed_slot_is_reused_at_same_offset() {
        let mut state = state(10);
        let first = insert(&mut state, json!({"name": "abcdefgh"}));
        insert(&mut state, json!({"name": "tail"}));
        let rec = record(&mut state, first);
        state.remove_record(first.page, &rec).unwrap();
        assert_eq!(state.free_list().unwrap(), vec![first.position]);

        let reused = insert(&mut state, json!({"name": "xy"}));
        assert_eq!(reused.position, first.position);
        assert_eq!(reused.slot, Some(u64::from(rec.total_size)));
        assert!(state.free_list().unwrap().is_empty());
    }

    #[test]
    fn unlinks_from_middle_of_free_list() {
        let mut state = state(10);
        let big = insert(&mut state, json!("a very long string payload here"));
        insert(&mut state, json!(0));
        let small = insert(&mut state, json!("ab"));
        insert(&mut state, json!(0));

        let big_rec = record(&mut state, big);
        let small_rec = record(&mut state, small);
        state.remove_record(big.page, &big_rec).unwrap();
        state.remove_record(small.page, &small_rec).unwrap();
        assert_eq!(state.free_list().unwrap(), vec![small.position, big.position]);

        // Too big for the head, fits the second entry.
        let placed = insert(&mut state, json!("a long string payload"));
        assert_eq!(placed.position, big.position);
        assert_eq!(state.free_list().unwrap(), vec![small.position]);
    }

    #[test]
    fn full_page_slots_are_skipped() {
        let mut state = state(1);
        let first = insert(&mut state, json!("aaaa"));
        insert(&mut state, json!("bbbb"));
        let rec = record(&mut state, first);
        state.remove_record(first.page, &rec).unwrap();
        // Page 1 now has room again.
        let reused = insert(&mut state, json!("cc"));
        assert_eq!(reused.position, first.position);
        // Page 1 is full again, so the next insert cannot land there.
        let other = insert(&mut state, json!("dd"));
        assert_ne!(other.page, 1);
    }

    #[test]
    fn exact_fit_only_matches_equal_span() {
        let mut state = state(10);
        let placed = insert(&mut state, json!("0123456789"));
        insert(&mut state, json!(0));
        let rec = record(&mut state, placed);
        state.remove_record(placed.page, &rec).unwrap();

        let wrong = state.place(Fit::Exact { total: 288 }).unwrap();
        assert_eq!(wrong.slot, None);
        let right = state
            .place(Fit::Exact {
                total: u64::from(rec.total_size),
            })
            .unwrap();
        assert_eq!(right.position, placed.position);
    }

    #[test]
    fn relocation_keeps_counts() {
        let mut state = state(10);
        let placed = insert(&mut state, json!("ab"));
        insert(&mut state, json!(0));
        let rec = record(&mut state, placed);
        let moved = state
            .relocate(placed.page, &rec, serde_json::to_vec(&json!("much longer")).unwrap())
            .unwrap();
        assert_ne!(moved.position, placed.position);
        assert_eq!(state.header.count, 2);
        assert_eq!(state.pages[0].count, 2);
        assert_eq!(state.free_list().unwrap(), vec![placed.position]);
    }
}
