//! Dump command implementation.

use slotdb_core::entry::Entry;
use slotdb_core::CoreResult;
use std::path::Path;

/// Runs the dump command.
///
/// Without `page`, prints up to `limit` records as JSON lines in page
/// order. With `page`, prints every entry of that page with its offset.
pub async fn run(
    path: &Path,
    limit: Option<usize>,
    page: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path).await?;
    let outcome = match page {
        Some(number) => dump_page(&store, number, limit),
        None => dump_records(&store, limit),
    };
    store.close().await?;
    outcome
}

fn dump_records(
    store: &slotdb_core::Store,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = collect_records(store, limit)?;
    for record in &records {
        println!("{record}");
    }
    eprintln!("{} record(s)", records.len());
    Ok(())
}

/// Reads records page by page through the raw entry walk, so unlike a
/// store scan nothing is written back to the file.
fn collect_records(store: &slotdb_core::Store, limit: Option<usize>) -> CoreResult<Vec<String>> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    for page in store.info()?.pages {
        for (_, entry) in store.page_entries(page.number)? {
            if records.len() >= limit {
                return Ok(records);
            }
            if let Entry::Data(data) = entry {
                records.push(String::from_utf8_lossy(&data.payload).into_owned());
            }
        }
    }
    Ok(records)
}

fn dump_page(
    store: &slotdb_core::Store,
    number: u32,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = store.page_entries(number)?;
    let total = entries.len();
    for (offset, entry) in entries.iter().take(limit.unwrap_or(usize::MAX)) {
        println!("{offset:>10}  {}", describe(entry));
    }
    eprintln!("{total} entr{} on page {number}", if total == 1 { "y" } else { "ies" });
    Ok(())
}

fn describe(entry: &Entry) -> String {
    match entry {
        Entry::Data(data) => format!(
            "data     {}/{} bytes  {}",
            data.size(),
            data.total_size,
            String::from_utf8_lossy(&data.payload)
        ),
        Entry::Free(free) => format!("free     {} bytes  next {}", free.size, free.next),
        Entry::Page(page) => format!(
            "page     #{}  {} records  end {}  next {}",
            page.number, page.count, page.end, page.next
        ),
        Entry::Index(index) => format!("index    [{}]", index.properties.join(", ")),
        Entry::IndexExtra(slot) => {
            format!(
                "extra    hash {}  page {} position {}",
                slot.hash, slot.page, slot.position
            )
        }
        Entry::Sequence(seq) => {
            format!("sequence {}  value {}", seq.property, seq.value as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slotdb_core::{Config, Store};
    use tempfile::tempdir;

    #[tokio::test]
    async fn records_are_read_without_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.db");
        let store = Store::open(&path, Config::default().page_size(2)).await.unwrap();
        for n in 0..5 {
            store.add(json!({ "n": n })).await.unwrap();
        }
        store.close().await.unwrap();

        let store = crate::commands::open_existing(&path).await.unwrap();
        let all = collect_records(&store, None).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0], r#"{"n":0}"#);
        assert_eq!(collect_records(&store, Some(3)).unwrap().len(), 3);
        assert!(collect_records(&store, Some(0)).unwrap().is_empty());
        assert_eq!(store.stats().bytes_written, 0);
        store.close().await.unwrap();
    }
}
