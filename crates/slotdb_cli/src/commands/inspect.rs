//! Inspect command implementation.

use serde::Serialize;
use slotdb_core::{Header, IndexInfo, Page, Sequence, StoreInfo};
use std::path::Path;

/// File inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// File path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Decoded file header.
    pub header: Header,
    /// Number of pages.
    pub page_count: usize,
    /// Entries on the free list.
    pub free_entries: usize,
    /// Named sequences.
    pub sequences: Vec<Sequence>,
    /// Hash indexes.
    pub indexes: Vec<IndexInfo>,
    /// Page descriptors (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<Page>>,
}

impl InspectResult {
    fn new(path: &Path, info: StoreInfo, show_pages: bool) -> Self {
        Self {
            path: path.display().to_string(),
            file_size: info.file_size,
            page_count: info.pages.len(),
            free_entries: info.free_entries,
            header: info.header,
            sequences: info.sequences,
            indexes: info.indexes,
            pages: show_pages.then_some(info.pages),
        }
    }
}

/// Runs the inspect command.
pub async fn run(
    path: &Path,
    show_pages: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path).await?;
    let info = store.info()?;
    store.close().await?;

    let result = InspectResult::new(path, info, show_pages);
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    let header = &result.header;
    let version = header.version.map(|b| b.to_string()).join(".");

    println!("slotdb File Inspection");
    println!("======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Header:");
    println!("  Format version:  {version}");
    println!("  Charset:         {}", header.charset);
    println!("  Page size:       {} records", header.page_size);
    println!("  Resident pages:  {}", header.in_memory_pages);
    println!();
    println!("Storage:");
    println!("  File size:       {} bytes", format_size(result.file_size));
    println!("  Pages:           {}", result.page_count);
    println!("  Free entries:    {}", result.free_entries);
    println!();
    println!("Records:");
    println!("  Count:           {}", header.count);
    println!("  Payload bytes:   {}", format_size(header.space_used));

    if !result.sequences.is_empty() {
        println!();
        println!("Sequences:");
        for seq in &result.sequences {
            println!(
                "  {} ({:?}) start {}, increment {}, value {}",
                seq.name, seq.kind, seq.start_at, seq.increment, seq.value
            );
        }
    }

    if !result.indexes.is_empty() {
        println!();
        println!("Indexes:");
        for index in &result.indexes {
            println!(
                "  [{}] {} buckets, {} occupied, at {}",
                index.properties.join(", "),
                index.buckets,
                index.occupied,
                index.start
            );
        }
    }

    if let Some(pages) = &result.pages {
        println!();
        println!("Pages:");
        for page in pages {
            println!(
                "  #{} at {}..{}, {} records, {} uses",
                page.number, page.start, page.end, page.count, page.uses
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
