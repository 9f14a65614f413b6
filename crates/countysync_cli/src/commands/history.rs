//! History command implementation.

use countysync_engine::{RunOutcome, SyncConfig, SyncEngine};
use std::path::Path;

/// Prints the most recent sync runs, newest first.
pub fn run(output_dir: &Path, limit: usize, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = SyncEngine::open(SyncConfig::new(output_dir))?;
    let history = engine.history(limit)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No runs recorded at {:?}", output_dir);
        return Ok(());
    }

    println!(
        "{:<38} {:>8} {:>8} {:>8} {:>10} {:>10}  outcome",
        "run", "added", "updated", "deleted", "unchanged", "elapsed"
    );
    for result in &history {
        let outcome = match &result.outcome {
            RunOutcome::Completed => "completed".to_string(),
            RunOutcome::Failed { stage, error } => format!("failed ({stage}): {error}"),
        };
        println!(
            "{:<38} {:>8} {:>8} {:>8} {:>10} {:>8}ms  {}",
            result.run_id,
            result.added,
            result.updated,
            result.deleted,
            result.unchanged,
            result.elapsed_ms,
            outcome
        );
    }

    Ok(())
}
