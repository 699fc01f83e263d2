use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::error::Result;
use crate::types::ProductSnapshot;

/// Load the newest `products_*.json` snapshot from `data_dir`.
/// No matching files (or no directory yet) is not an error — the collector
/// simply has not run; callers get an empty dataset.
pub fn load_latest(data_dir: &Path) -> Result<Vec<ProductSnapshot>> {
    let mut files = snapshot_files(data_dir);
    if files.is_empty() {
        warn!("no snapshot files found in {}", data_dir.display());
        return Ok(Vec::new());
    }

    // Newest by modification time, matching the collector's write cadence.
    files.sort_by_key(|path| modified_at(path));
    let Some(latest) = files.last() else {
        return Ok(Vec::new());
    };
    info!("loading snapshot {}", latest.display());
    parse_snapshot_file(latest)
}

/// Concatenate the trailing `days` snapshot files (one file per daily run,
/// ordered by the datestamp embedded in the filename).
pub fn load_historical(data_dir: &Path, days: usize) -> Result<Vec<ProductSnapshot>> {
    let mut files = snapshot_files(data_dir);
    if files.is_empty() {
        return Ok(Vec::new());
    }
    files.sort();
    let recent = if files.len() > days {
        &files[files.len() - days..]
    } else {
        &files[..]
    };

    let mut rows = Vec::new();
    for path in recent {
        rows.extend(parse_snapshot_file(path)?);
    }
    Ok(rows)
}

fn parse_snapshot_file(path: &Path) -> Result<Vec<ProductSnapshot>> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn snapshot_files(data_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(data_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("products_") && name.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect()
}

fn modified_at(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
