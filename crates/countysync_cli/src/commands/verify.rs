//! Verify command implementation.

use countysync_engine::{SyncConfig, SyncEngine};
use std::path::Path;

/// Checks every store against the current snapshot.
pub fn run(output_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying sync state at {:?}", output_dir);

    let engine = SyncEngine::open(SyncConfig::new(output_dir))?;
    let report = engine.verify()?;

    println!(
        "Snapshot generation {} with {} keys",
        report.snapshot_generation, report.snapshot_keys
    );

    if report.is_clean() {
        println!("OK: all stores consistent with the snapshot");
        Ok(())
    } else {
        for issue in &report.issues {
            println!("  ISSUE: {issue}");
        }
        Err(format!("{} consistency issues found", report.issues.len()).into())
    }
}
