//! Clearing or archiving the outputs of earlier rounds.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

pub const ARCHIVE_PREFIX: &str = "archive_";

/// Deletes everything inside each directory; missing directories are skipped.
pub fn clear_directories(dirs: &[&Path]) -> std::io::Result<()> {
    for dir in dirs {
        if !dir.exists() {
            debug!("Nothing to clear in {}", dir.display());
            continue;
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        info!("Cleared {}", dir.display());
    }
    Ok(())
}

/// Moves the contents of each directory into `archive_<timestamp>/` inside
/// it. Earlier archive folders move along with everything else, so archived
/// sheets stay reachable for the recursive dedup scan.
pub fn archive_directories(dirs: &[&Path]) -> std::io::Result<String> {
    let name = format!("{ARCHIVE_PREFIX}{}", Local::now().format("%Y%m%d_%H%M%S"));
    for dir in dirs {
        archive_into(dir, &name)?;
    }
    Ok(name)
}

fn archive_into(dir: &Path, archive_name: &str) -> std::io::Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }
    let entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(archive_name))
        .collect();
    if entries.is_empty() {
        return Ok(None);
    }

    let target = dir.join(archive_name);
    fs::create_dir_all(&target)?;
    for path in entries {
        let Some(name) = path.file_name() else {
            continue;
        };
        if let Err(e) = fs::rename(&path, target.join(name)) {
            warn!("Could not archive {}: {e}", path.display());
        }
    }
    info!("Archived {} into {}", dir.display(), target.display());
    Ok(Some(target))
}
