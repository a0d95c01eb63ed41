use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::warn;

use crate::tracker::ActivityTracker;

/// Files directly under `input_dir` (or anywhere below it when `recursive`)
/// whose names end with `.<extension>`, in glob order.
pub fn find_existing(
    input_dir: &Path,
    extension: &str,
    recursive: bool,
) -> Result<Vec<PathBuf>, glob::PatternError> {
    let root = glob::Pattern::escape(&input_dir.to_string_lossy());
    let pattern = if recursive {
        format!("{root}/**/*.{extension}")
    } else {
        format!("{root}/*.{extension}")
    };

    let mut found = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) if path.is_file() => found.push(path),
            Ok(_) => {}
            Err(err) => warn!("Could not read path while scanning: {err}"),
        }
    }
    Ok(found)
}

/// Feeds files already on disk through the tracker as if they had just been
/// created. Returns how many were queued.
pub fn enqueue_existing(
    tracker: &mut ActivityTracker,
    input_dir: &Path,
    extension: &str,
    recursive: bool,
    now: Instant,
) -> Result<usize, glob::PatternError> {
    let mut queued = 0;
    for path in find_existing(input_dir, extension, recursive)? {
        tracker.on_created(&path, false, now);
        if tracker.is_pending(&path) {
            queued += 1;
        }
    }
    Ok(queued)
}
