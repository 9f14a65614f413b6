//! Run command implementation.

use countysync_engine::{SyncConfig, SyncEngine};
use countysync_model::{Record, RecordBatch, Schema};
use countysync_testkit::ParcelGenerator;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the run's input records come from.
pub enum Source {
    /// JSON array of parcel records on disk.
    File(PathBuf),
    /// Synthetic parcels from the seeded generator.
    Generated {
        /// Number of parcels.
        count: usize,
        /// Generator seed.
        seed: u64,
    },
}

/// Runs one sync over the selected input.
pub fn run(
    output_dir: &Path,
    source: Source,
    batch_size: usize,
    list_rejected: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let records: Vec<Record> = match source {
        Source::File(input) => {
            let data = fs::read_to_string(&input)?;
            let records: Vec<Record> = serde_json::from_str(&data)?;
            println!("Read {} records from {:?}", records.len(), input);
            records
        }
        Source::Generated { count, seed } => {
            let records = ParcelGenerator::new(seed).records(count);
            println!("Generated {} synthetic records (seed {})", records.len(), seed);
            records
        }
    };

    let batch = RecordBatch::validate(Schema::parcel_default(), records);
    if !batch.rejected().is_empty() {
        println!("Rejected {} malformed records", batch.rejected().len());
        if list_rejected {
            for rejected in batch.rejected() {
                let key = rejected.key.as_deref().unwrap_or("<no key>");
                println!("  [{}] {}: {}", rejected.index, key, rejected.reason);
            }
        }
    }

    let config = SyncConfig::new(output_dir).with_batch_size(batch_size);
    let engine = SyncEngine::open(config)?;
    let result = engine.run(&batch)?;

    println!();
    println!("Run {} completed in {} ms", result.run_id, result.elapsed_ms);
    println!("  Added:     {}", result.added);
    println!("  Updated:   {}", result.updated);
    println!("  Deleted:   {}", result.deleted);
    println!("  Unchanged: {}", result.unchanged);
    println!("  Malformed: {}", result.malformed);
    println!("  Snapshot generation: {}", result.snapshot_generation);

    Ok(())
}
