//! Generate command implementation.

use countysync_testkit::ParcelGenerator;
use std::fs;
use std::path::Path;

/// Writes `count` synthetic parcel records as a JSON array.
pub fn run(out: &Path, count: usize, seed: u64) -> Result<(), Box<dyn std::error::Error>> {
    let records = ParcelGenerator::new(seed).records(count);
    let json = serde_json::to_string_pretty(&records)?;

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(out, json)?;

    println!("Generated {} records (seed {}) to {:?}", count, seed, out);
    Ok(())
}
