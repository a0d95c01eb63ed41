use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use datwatch_parser::LrSample;

use crate::error::{ConvertError, Result};

pub const LR_LOG_FILE_NAME: &str = "LR.txt";
pub const LR_LOG_HEADER: &str = "EPIC LR Log File\n\nDate,LR\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReport {
    pub path: PathBuf,
    pub lines_written: usize,
    /// True when this call created the log file and wrote its header.
    pub created: bool,
}

/// `<base>/<YYYY>/<YYYY_MM_DD>` for the given processing time.
pub fn dated_output_dir(base: &Path, now: NaiveDateTime) -> PathBuf {
    base.join(now.format("%Y").to_string())
        .join(now.format("%Y_%m_%d").to_string())
}

/// Appends samples to the day's `LR.txt`, writing the header first if the
/// file does not exist yet. Existing content is never rewritten.
pub fn append_samples(
    base: &Path,
    now: NaiveDateTime,
    samples: &[LrSample],
) -> Result<AppendReport> {
    let dir = dated_output_dir(base, now);
    fs::create_dir_all(&dir).map_err(|err| ConvertError::io(&dir, err))?;

    let path = dir.join(LR_LOG_FILE_NAME);
    let created = !path.is_file();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| ConvertError::io(&path, err))?;
    let mut writer = BufWriter::new(file);

    let mut write_all = |text: &str| {
        writer
            .write_all(text.as_bytes())
            .map_err(|err| ConvertError::io(&path, err))
    };

    if created {
        write_all(LR_LOG_HEADER)?;
    }
    for sample in samples {
        write_all(&sample.to_epic_line())?;
    }

    writer.flush().map_err(|err| ConvertError::io(&path, err))?;

    Ok(AppendReport {
        path,
        lines_written: samples.len(),
        created,
    })
}
