use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use datwatch_parser::formats::schema::LR_FRAME_COLUMNS;
use datwatch_parser::{decode_lossy, parse_lr_dat, LrLog, ParserError};
use polars::prelude::{ParquetWriter, PolarsError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::convert::file_base_time;
use crate::error::ConvertError;

pub const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO operation failed on '{}': {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Reading source failed: {0}")]
    Source(#[from] ConvertError),
    #[error("Parser failed: {0}")]
    Parser(#[from] ParserError),
    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("CSV operation failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON operation failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Parquet,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Parquet => "parquet",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parquet" | "pq" => Ok(ExportFormat::Parquet),
            "csv" => Ok(ExportFormat::Csv),
            "json" | "jsonl" | "ndjson" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub output: PathBuf,
    pub format: ExportFormat,
    pub rows: usize,
    pub skipped_lines: usize,
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    timestamp: String,
    offset_s: f64,
    lr: Option<f64>,
    lr_raw: &'a str,
}

/// Reads an LR `.dat` file and writes its samples as a flat table.
pub fn export_file(
    source: &Path,
    output: &Path,
    format: ExportFormat,
) -> Result<ExportReport, ExportError> {
    let base_time = file_base_time(source)?;
    let bytes = fs::read(source).map_err(|source_err| ExportError::Io {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    let log = parse_lr_dat(&decode_lossy(&bytes), base_time);

    export_log(&log, output, format)?;

    info!(
        source = %source.display(),
        format = format.as_str(),
        "Exported {} rows to: {}",
        log.len(),
        output.display()
    );

    Ok(ExportReport {
        output: output.to_path_buf(),
        format,
        rows: log.len(),
        skipped_lines: log.skipped.len(),
    })
}

/// Writes `log` to `output`. Rows go to a sibling `.tmp` file that is renamed
/// into place, so a failed export never leaves a partial file at `output`.
pub fn export_log(log: &LrLog, output: &Path, format: ExportFormat) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp_name = output.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = File::create(&tmp_path)
        .map_err(io_err)
        .and_then(|file| write_rows(log, file, format, output))
        .and_then(|()| fs::rename(&tmp_path, output).map_err(io_err));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_rows(
    log: &LrLog,
    file: File,
    format: ExportFormat,
    output: &Path,
) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: output.to_path_buf(),
        source,
    };

    match format {
        ExportFormat::Parquet => {
            let mut df = log.to_dataframe()?;
            ParquetWriter::new(file).finish(&mut df)?;
        }
        ExportFormat::Csv => {
            // Header is written explicitly so an empty log still gets one.
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record(LR_FRAME_COLUMNS)?;
            for row in export_rows(log) {
                writer.serialize(row)?;
            }
            writer.flush().map_err(io_err)?;
        }
        ExportFormat::Json => {
            let mut writer = BufWriter::new(file);
            for row in export_rows(log) {
                serde_json::to_writer(&mut writer, &row)?;
                writer.write_all(b"\n").map_err(io_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
    }

    Ok(())
}

fn export_rows(log: &LrLog) -> impl Iterator<Item = ExportRow<'_>> {
    log.samples.iter().map(|sample| ExportRow {
        timestamp: sample.timestamp.format(ISO_TIMESTAMP_FORMAT).to_string(),
        offset_s: sample.offset_seconds,
        lr: sample.numeric_intensity(),
        lr_raw: &sample.intensity,
    })
}
