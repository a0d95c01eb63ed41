use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use datwatch_parser::{decode_lossy, parse_lr_dat};
use tracing::info;

use crate::epic::append_samples;
use crate::error::{ConvertError, Result};

#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub lines_written: usize,
    pub skipped_lines: usize,
    pub content_hash: String,
}

/// Local wall-clock time the file was created. Platforms that do not report
/// a creation time fall back to the modification time.
pub fn file_base_time(path: &Path) -> Result<NaiveDateTime> {
    let metadata = fs::metadata(path).map_err(|err| ConvertError::io(path, err))?;
    let stamp = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map_err(|err| ConvertError::io(path, err))?;
    Ok(system_time_to_local(stamp))
}

pub fn system_time_to_local(stamp: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(stamp).naive_local()
}

pub fn compute_hash(contents: &[u8]) -> String {
    blake3::hash(contents).to_hex().to_string()
}

/// Converts an LR `.dat` file into EPIC rows and appends them under the dated
/// directory for `now`.
pub fn convert_file_at(
    path: &Path,
    output_dir: &Path,
    now: NaiveDateTime,
) -> Result<ConversionReport> {
    let base_time = file_base_time(path)?;
    let bytes = fs::read(path).map_err(|err| ConvertError::io(path, err))?;
    let content_hash = compute_hash(&bytes);

    let log = parse_lr_dat(&decode_lossy(&bytes), base_time);
    let report = append_samples(output_dir, now, &log.samples)?;

    info!(
        source = %path.display(),
        skipped = log.skipped.len(),
        "Appended {} lines to: {}",
        report.lines_written,
        report.path.display()
    );

    Ok(ConversionReport {
        source: path.to_path_buf(),
        output: report.path,
        lines_written: report.lines_written,
        skipped_lines: log.skipped.len(),
        content_hash,
    })
}

pub fn convert_lr_to_epic(path: &Path, output_dir: &Path) -> Result<ConversionReport> {
    convert_file_at(path, output_dir, Local::now().naive_local())
}
