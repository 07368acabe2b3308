//! Read-only inspection: layout summaries and integrity checks.

use crate::entry::{
    entry_span, DataEntry, Entry, EntryType, FreeEntry, Header, Page, PAGE_ENTRY_SIZE,
};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexInfo;
use crate::sequence::Sequence;
use crate::state::State;
use crate::store::Store;
use serde::Serialize;
use std::collections::HashSet;

/// Snapshot of a store's layout.
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    /// In-memory header.
    pub header: Header,
    /// Backend size in bytes.
    pub file_size: u64,
    /// Page descriptors, by number.
    pub pages: Vec<Page>,
    /// Sequences, newest first.
    pub sequences: Vec<Sequence>,
    /// Indexes, in creation order.
    pub indexes: Vec<IndexInfo>,
    /// Pages whose bytes are cached.
    pub resident_pages: usize,
    /// Entries on the free list.
    pub free_entries: usize,
}

/// Result of [`Store::check_integrity`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Data entries found by walking every page.
    pub data_records: u64,
    /// Sum of their payload sizes.
    pub payload_bytes: u64,
    /// Entries reachable from the free list head.
    pub free_entries: usize,
    /// Everything that did not add up.
    pub problems: Vec<String>,
}

impl IntegrityReport {
    /// Whether no problems were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

impl State {
    fn check_page(&self, page: &Page, report: &mut IntegrityReport) {
        let bytes = match self.page_bytes(page.number) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.problems.push(format!("page {}: {e}", page.number));
                return;
            }
        };
        let mut rel = PAGE_ENTRY_SIZE;
        let mut records = 0u32;
        while rel < bytes.len() {
            let at = page.start + rel as u64;
            let (kind, span) = match entry_span(&bytes, rel) {
                Ok(found) => found,
                Err(e) => {
                    report.problems.push(format!("page {} at {at}: {e}", page.number));
                    return;
                }
            };
            if rel as u64 + span > bytes.len() as u64 {
                report.problems.push(format!(
                    "page {}: entry at {at} spans {span} bytes past the page end {}",
                    page.number, page.end
                ));
                return;
            }
            match kind {
                EntryType::Data => match DataEntry::decode_frame(&bytes, rel) {
                    Ok((size, _)) => {
                        records += 1;
                        report.data_records += 1;
                        report.payload_bytes += u64::from(size);
                    }
                    Err(e) => report.problems.push(format!("page {} at {at}: {e}", page.number)),
                },
                EntryType::Free | EntryType::IndexExtra | EntryType::Sequence => {}
                EntryType::Page | EntryType::Index => report.problems.push(format!(
                    "page {}: unexpected {kind:?} entry at {at}",
                    page.number
                )),
            }
            rel += span as usize;
        }
        if records != page.count {
            report.problems.push(format!(
                "page {} holds {records} records but counts {}",
                page.number, page.count
            ));
        }
    }

    fn check_free_list(&self, report: &mut IntegrityReport) {
        let mut seen = HashSet::new();
        let mut next = self.header.next_free;
        while next != 0 {
            if !seen.insert(next) {
                report.problems.push(format!("free list loops back to {next}"));
                return;
            }
            if self.page_at(next).is_none() {
                report.problems.push(format!("free entry at {next} lies outside every page"));
                return;
            }
            match self
                .read(next, FreeEntry::HEADER_SIZE)
                .and_then(|b| FreeEntry::decode(&b, 0))
            {
                Ok(entry) => {
                    report.free_entries += 1;
                    next = entry.next;
                }
                Err(e) => {
                    report.problems.push(format!("free entry at {next}: {e}"));
                    return;
                }
            }
        }
    }

    /// Decodes every entry in page `number`, descriptor included.
    pub fn page_entries(&self, number: u32) -> CoreResult<Vec<(u64, Entry)>> {
        let page = *self.page(number)?;
        let bytes = self.page_bytes(number)?;
        let mut entries = Vec::new();
        let mut rel = 0;
        while rel < bytes.len() {
            let position = page.start + rel as u64;
            let (_, span) = entry_span(&bytes, rel)?;
            entries.push((position, Entry::decode(&bytes, rel, position)?));
            rel += span as usize;
        }
        Ok(entries)
    }

    pub fn check_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        for page in &self.pages {
            self.check_page(page, &mut report);
        }
        if report.data_records != self.header.count {
            report.problems.push(format!(
                "header counts {} records, pages hold {}",
                self.header.count, report.data_records
            ));
        }
        if report.payload_bytes != self.header.space_used {
            report.problems.push(format!(
                "header counts {} payload bytes, pages hold {}",
                self.header.space_used, report.payload_bytes
            ));
        }
        self.check_free_list(&mut report);
        report
    }
}

impl Store {
    /// Summarizes the file layout.
    pub fn info(&self) -> CoreResult<StoreInfo> {
        let state = self.state.lock();
        Ok(StoreInfo {
            header: state.header.clone(),
            file_size: state.backend()?.size()?,
            pages: state.pages.clone(),
            sequences: state.sequences.iter().map(Sequence::from).collect(),
            indexes: state.indexes.iter().map(|i| i.info()).collect(),
            resident_pages: state.cache.resident_count(),
            free_entries: state.free_list()?.len(),
        })
    }

    /// Every entry in page `number` with its absolute offset, starting with
    /// the page descriptor itself.
    pub fn page_entries(&self, number: u32) -> CoreResult<Vec<(u64, Entry)>> {
        let state = self.state.lock();
        if number == 0 || number as usize > state.pages.len() {
            return Err(CoreError::not_found("page", number.to_string()));
        }
        state.page_entries(number)
    }

    /// Walks every page and the free list and checks them against the
    /// header. Nothing is repaired.
    pub async fn check_integrity(&self) -> CoreResult<IntegrityReport> {
        self.admit().await?;
        self.commit(|state| Ok(state.check_integrity())).await
    }
}
