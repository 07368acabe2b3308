//! Verify command implementation.

use slotdb_core::IntegrityReport;
use std::path::Path;

/// Runs the verify command.
pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {:?}", path);
    println!();

    let store = super::open_existing(path).await?;
    let header = store.header();
    let report = store.check_integrity().await?;
    store.close().await?;

    print_report(&report, header.count, header.space_used);

    println!();
    if report.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}

fn print_report(report: &IntegrityReport, count: u64, space_used: u64) {
    println!(
        "  Records found: {}, header says: {}",
        report.data_records, count
    );
    println!(
        "  Payload bytes: {}, header says: {}",
        report.payload_bytes, space_used
    );
    println!("  Free entries:  {}", report.free_entries);
    for problem in &report.problems {
        println!("    ERROR: {}", problem);
    }
}
