use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, error, info, warn};

use crate::convert::{compute_hash, convert_lr_to_epic, ConversionReport};
use crate::error::Result;
use crate::ledger::ProcessedLedger;

/// Something that turns a settled input file into output.
pub trait FileProcessor {
    fn process(&mut self, path: &Path) -> Result<ConversionReport>;
}

/// Appends converted LR rows to the EPIC log tree rooted at `output_dir`.
#[derive(Debug, Clone)]
pub struct EpicConverter {
    output_dir: PathBuf,
}

impl EpicConverter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl FileProcessor for EpicConverter {
    fn process(&mut self, path: &Path) -> Result<ConversionReport> {
        convert_lr_to_epic(path, &self.output_dir)
    }
}

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub extension: String,
    pub inactivity_period: Duration,
    pub dedupe_by_content: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            extension: "dat".to_string(),
            inactivity_period: Duration::from_secs(30),
            dedupe_by_content: false,
        }
    }
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Converted(ConversionReport),
    /// Content hash matched the last processed version; nothing was written.
    Unchanged(PathBuf),
    Vanished(PathBuf),
    /// Metadata could not be read; the file stays pending.
    Deferred { path: PathBuf, reason: String },
    Failed { path: PathBuf, reason: String },
}

impl ProcessOutcome {
    /// Whether the ledger changed as a result of this outcome.
    pub fn touched_ledger(&self) -> bool {
        matches!(
            self,
            ProcessOutcome::Converted(_)
                | ProcessOutcome::Unchanged(_)
                | ProcessOutcome::Failed { .. }
        )
    }
}

/// Debounces filesystem activity: a file is handed to the processor only
/// after it has been quiet for the inactivity period, and only once per
/// observed modification time.
#[derive(Debug)]
pub struct ActivityTracker {
    options: TrackerOptions,
    pending: HashMap<PathBuf, Instant>,
    ledger: ProcessedLedger,
}

impl ActivityTracker {
    pub fn new(options: TrackerOptions, ledger: ProcessedLedger) -> Self {
        Self {
            options,
            pending: HashMap::new(),
            ledger,
        }
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        let suffix = format!(".{}", self.options.extension);
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&suffix))
    }

    /// Only files whose mtime is newer than what has been processed are tracked.
    pub fn should_track(&self, path: &Path) -> bool {
        match modified_time(path) {
            Ok(mtime) => self.ledger.is_newer(path, mtime),
            Err(err) => {
                debug!(path = %path.display(), "not tracking file: {err}");
                false
            }
        }
    }

    pub fn on_created(&mut self, path: &Path, is_dir: bool, now: Instant) {
        if is_dir || !self.matches_extension(path) {
            return;
        }
        if self.should_track(path) {
            info!("Detected new file: {}", path.display());
            self.pending.insert(path.to_path_buf(), now);
        }
    }

    /// Editors and instruments can emit many modify events per write; only a
    /// modification time newer than the last processed one re-queues a file.
    pub fn on_modified(&mut self, path: &Path, is_dir: bool, now: Instant) {
        if is_dir || !self.matches_extension(path) {
            return;
        }
        if self.should_track(path) {
            self.pending.insert(path.to_path_buf(), now);
        }
    }

    pub fn due_files(&self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(path, last_activity)| {
                debug!(path = %path.display(), "Checking file");
                now.saturating_duration_since(**last_activity) > self.options.inactivity_period
            })
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();
        due
    }

    pub fn check_and_process<P>(&mut self, now: Instant, processor: &mut P) -> Vec<ProcessOutcome>
    where
        P: FileProcessor + ?Sized,
    {
        self.due_files(now)
            .into_iter()
            .map(|path| self.process_one(path, &mut *processor))
            .collect()
    }

    fn process_one<P>(&mut self, path: PathBuf, processor: &mut P) -> ProcessOutcome
    where
        P: FileProcessor + ?Sized,
    {
        info!("Processing file: {}", path.display());

        // Captured before processing; a write during conversion leaves a newer mtime.
        let latest_mtime = match modified_time(&path) {
            Ok(mtime) => mtime,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("File disappeared before processing: {}", path.display());
                self.pending.remove(&path);
                return ProcessOutcome::Vanished(path);
            }
            Err(err) => {
                error!("Error processing {}: {err}", path.display());
                return ProcessOutcome::Deferred {
                    path,
                    reason: err.to_string(),
                };
            }
        };

        if self.options.dedupe_by_content {
            match fs::read(&path) {
                Ok(bytes) => {
                    let hash = compute_hash(&bytes);
                    let unchanged = self
                        .ledger
                        .get(&path)
                        .and_then(|entry| entry.content_hash.as_deref())
                        == Some(hash.as_str());
                    if unchanged {
                        info!("Content unchanged, skipping: {}", path.display());
                        self.ledger.record(&path, latest_mtime, Some(hash));
                        self.pending.remove(&path);
                        return ProcessOutcome::Unchanged(path);
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    warn!("File disappeared before processing: {}", path.display());
                    self.pending.remove(&path);
                    return ProcessOutcome::Vanished(path);
                }
                Err(err) => {
                    error!("Error processing {}: {err}", path.display());
                    return ProcessOutcome::Deferred {
                        path,
                        reason: err.to_string(),
                    };
                }
            }
        }

        let outcome = match processor.process(&path) {
            Ok(report) => {
                self.ledger
                    .record(&path, latest_mtime, Some(report.content_hash.clone()));
                ProcessOutcome::Converted(report)
            }
            Err(err) => {
                error!("Failed to convert file {}: {err}", path.display());
                self.ledger.record(&path, latest_mtime, None);
                ProcessOutcome::Failed {
                    path: path.clone(),
                    reason: err.to_string(),
                }
            }
        };
        self.pending.remove(&path);
        outcome
    }
}

fn modified_time(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
