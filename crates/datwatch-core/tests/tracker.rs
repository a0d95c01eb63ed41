use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use datwatch_core::convert::{compute_hash, ConversionReport};
use datwatch_core::error::{ConvertError, Result};
use datwatch_core::ledger::ProcessedLedger;
use datwatch_core::tracker::{
    ActivityTracker, EpicConverter, FileProcessor, ProcessOutcome, TrackerOptions,
};

#[derive(Default)]
struct RecordingProcessor {
    seen: Vec<PathBuf>,
    fail: bool,
}

impl FileProcessor for RecordingProcessor {
    fn process(&mut self, path: &Path) -> Result<ConversionReport> {
        self.seen.push(path.to_path_buf());
        if self.fail {
            return Err(ConvertError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("disk full"),
            });
        }
        let bytes = fs::read(path).map_err(|source| ConvertError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ConversionReport {
            source: path.to_path_buf(),
            output: PathBuf::from("LR.txt"),
            lines_written: 1,
            skipped_lines: 0,
            content_hash: compute_hash(&bytes),
        })
    }
}

fn tracker(inactivity_secs: u64) -> ActivityTracker {
    ActivityTracker::new(
        TrackerOptions {
            extension: "dat".to_string(),
            inactivity_period: Duration::from_secs(inactivity_secs),
            dedupe_by_content: false,
        },
        ProcessedLedger::new(),
    )
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write file");
    path
}

fn bump_mtime(path: &Path, by: Duration) {
    let current = fs::metadata(path).expect("metadata").modified().expect("mtime");
    File::options()
        .write(true)
        .open(path)
        .expect("open")
        .set_modified(current + by)
        .expect("set mtime");
}

#[test]
fn only_matching_extension_files_are_tracked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dat = write_file(dir.path(), "run.dat", "0\t1\n");
    let txt = write_file(dir.path(), "run.txt", "0\t1\n");
    let upper = write_file(dir.path(), "run.DAT", "0\t1\n");

    let mut tracker = tracker(20);
    let now = Instant::now();
    tracker.on_created(&dat, false, now);
    tracker.on_created(&txt, false, now);
    tracker.on_created(&upper, false, now);

    assert!(tracker.is_pending(&dat));
    assert_eq!(tracker.pending_len(), 1);
}

#[test]
fn directories_and_missing_files_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sub = dir.path().join("nested.dat");
    fs::create_dir(&sub).expect("mkdir");

    let mut tracker = tracker(20);
    let now = Instant::now();
    tracker.on_created(&sub, true, now);
    tracker.on_modified(&dir.path().join("gone.dat"), false, now);

    assert_eq!(tracker.pending_len(), 0);
}

#[test]
fn files_wait_for_the_inactivity_period() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "run.dat", "0\t1\n");

    let mut tracker = tracker(20);
    let start = Instant::now();
    tracker.on_created(&path, false, start);

    let mut processor = RecordingProcessor::default();
    let early = tracker.check_and_process(start + Duration::from_secs(20), &mut processor);
    assert!(early.is_empty());
    assert!(tracker.is_pending(&path));

    let due = tracker.check_and_process(start + Duration::from_secs(21), &mut processor);
    assert_eq!(due.len(), 1);
    assert!(matches!(due[0], ProcessOutcome::Converted(_)));
    assert_eq!(processor.seen, vec![path.clone()]);
    assert!(!tracker.is_pending(&path));
}

#[test]
fn modify_events_push_back_the_deadline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "run.dat", "0\t1\n");

    let mut tracker = tracker(20);
    let start = Instant::now();
    tracker.on_created(&path, false, start);
    tracker.on_modified(&path, false, start + Duration::from_secs(15));

    assert!(tracker.due_files(start + Duration::from_secs(25)).is_empty());
    assert_eq!(
        tracker.due_files(start + Duration::from_secs(36)),
        vec![path.clone()]
    );
}

#[test]
fn duplicate_events_after_processing_do_not_requeue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "run.dat", "0\t1\n");

    let mut tracker = tracker(0);
    let start = Instant::now();
    tracker.on_created(&path, false, start);
    let mut processor = RecordingProcessor::default();
    tracker.check_and_process(start + Duration::from_secs(1), &mut processor);

    tracker.on_modified(&path, false, start + Duration::from_secs(2));
    assert!(!tracker.should_track(&path));
    assert_eq!(tracker.pending_len(), 0);

    bump_mtime(&path, Duration::from_secs(5));
    tracker.on_modified(&path, false, start + Duration::from_secs(3));
    assert!(tracker.is_pending(&path));
}

#[test]
fn vanished_files_are_dropped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "run.dat", "0\t1\n");

    let mut tracker = tracker(0);
    let start = Instant::now();
    tracker.on_created(&path, false, start);
    fs::remove_file(&path).expect("remove");

    let mut processor = RecordingProcessor::default();
    let outcomes = tracker.check_and_process(start + Duration::from_secs(1), &mut processor);

    assert!(matches!(outcomes[0], ProcessOutcome::Vanished(_)));
    assert!(processor.seen.is_empty());
    assert_eq!(tracker.pending_len(), 0);
    assert!(tracker.ledger().is_empty());
}

#[test]
fn failed_conversions_are_not_retried_until_modified() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "run.dat", "0\t1\n");

    let mut tracker = tracker(0);
    let start = Instant::now();
    tracker.on_created(&path, false, start);

    let mut processor = RecordingProcessor {
        fail: true,
        ..RecordingProcessor::default()
    };
    let outcomes = tracker.check_and_process(start + Duration::from_secs(1), &mut processor);

    assert!(matches!(outcomes[0], ProcessOutcome::Failed { .. }));
    assert_eq!(tracker.pending_len(), 0);
    assert!(!tracker.should_track(&path));
}

#[test]
fn due_files_are_processed_in_path_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let b = write_file(dir.path(), "b.dat", "0\t1\n");
    let a = write_file(dir.path(), "a.dat", "0\t1\n");

    let mut tracker = tracker(0);
    let start = Instant::now();
    tracker.on_created(&b, false, start);
    tracker.on_created(&a, false, start);

    let mut processor = RecordingProcessor::default();
    tracker.check_and_process(start + Duration::from_secs(1), &mut processor);
    assert_eq!(processor.seen, vec![a, b]);
}

#[test]
fn content_dedupe_skips_touched_but_identical_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "run.dat", "0\t1\n");

    let mut tracker = ActivityTracker::new(
        TrackerOptions {
            extension: "dat".to_string(),
            inactivity_period: Duration::ZERO,
            dedupe_by_content: true,
        },
        ProcessedLedger::new(),
    );
    let mut processor = RecordingProcessor::default();
    let start = Instant::now();

    tracker.on_created(&path, false, start);
    tracker.check_and_process(start + Duration::from_secs(1), &mut processor);

    bump_mtime(&path, Duration::from_secs(5));
    tracker.on_modified(&path, false, start + Duration::from_secs(2));
    let outcomes = tracker.check_and_process(start + Duration::from_secs(3), &mut processor);

    assert!(matches!(outcomes[0], ProcessOutcome::Unchanged(_)));
    assert_eq!(processor.seen.len(), 1);
    assert!(!tracker.should_track(&path));
}

#[test]
fn epic_converter_writes_under_output_dir() {
    let input = tempfile::tempdir().expect("input");
    let output = tempfile::tempdir().expect("output");
    let path = write_file(input.path(), "run.dat", "0\t1\n0.5\t2\n");

    let mut tracker = tracker(0);
    let start = Instant::now();
    tracker.on_created(&path, false, start);

    let mut converter = EpicConverter::new(output.path());
    let outcomes = tracker.check_and_process(start + Duration::from_secs(1), &mut converter);

    let ProcessOutcome::Converted(report) = &outcomes[0] else {
        panic!("expected conversion, got {:?}", outcomes[0]);
    };
    assert_eq!(report.lines_written, 2);
    assert!(report.output.starts_with(output.path()));
    assert!(report.output.is_file());
    let recorded = tracker
        .ledger()
        .get(&path)
        .expect("ledger entry")
        .mtime_micros;
    assert!(recorded > 0);
}

#[test]
fn unreadable_metadata_defers_without_touching_the_ledger() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sub = dir.path().join("run");
    fs::create_dir(&sub).expect("mkdir");
    let path = write_file(&sub, "run.dat", "0\t1\n");

    let mut tracker = tracker(0);
    let start = Instant::now();
    tracker.on_created(&path, false, start);
    assert!(tracker.is_pending(&path));

    // A file where a directory used to be makes the lookup fail with
    // "not a directory" rather than "not found".
    fs::remove_dir_all(&sub).expect("remove dir");
    fs::write(&sub, "not a directory").expect("replace with file");

    let mut processor = RecordingProcessor::default();
    let outcomes = tracker.check_and_process(start + Duration::from_secs(1), &mut processor);

    assert!(matches!(outcomes[0], ProcessOutcome::Deferred { .. }));
    assert!(!outcomes[0].touched_ledger());
    assert!(processor.seen.is_empty());
    assert!(tracker.is_pending(&path));
    assert!(tracker.ledger().is_empty());
}
