use std::fmt;

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ParserError;
use crate::formats::{format_epic_timestamp, parse_optional_f64, LrTwoColumnParser};
use crate::formats::schema::LR_FRAME_COLUMNS;

/// One converted reading: the instrument's time offset resolved against the
/// file's base time, plus the intensity exactly as it appeared in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrSample {
    pub line_index: usize,
    pub offset_seconds: f64,
    pub timestamp: NaiveDateTime,
    pub intensity: String,
}

impl LrSample {
    pub fn to_epic_line(&self) -> String {
        format!(
            "{},{}\n",
            format_epic_timestamp(&self.timestamp),
            self.intensity
        )
    }

    /// The intensity as a number, or `None` when it is blank, NaN or not
    /// numeric.
    pub fn numeric_intensity(&self) -> Option<f64> {
        parse_optional_f64(&self.intensity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub line_index: usize,
    pub content: String,
    pub reason: String,
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} ({})",
            self.line_index, self.content, self.reason
        )
    }
}

#[derive(Debug, Clone)]
pub struct LrLog {
    pub base_time: NaiveDateTime,
    pub samples: Vec<LrSample>,
    pub skipped: Vec<SkippedLine>,
}

impl LrLog {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn epic_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.samples.iter().map(LrSample::to_epic_line)
    }

    /// Tabular view of the samples. `lr` is null where the raw intensity is
    /// not a number; `lr_raw` always holds the original text.
    pub fn to_dataframe(&self) -> Result<DataFrame, ParserError> {
        let parser = LrTwoColumnParser::NAME;
        let row_count = self.samples.len();

        let mut timestamps = Vec::with_capacity(row_count);
        let mut offsets = Vec::with_capacity(row_count);
        let mut values = Vec::with_capacity(row_count);
        let mut raw = Vec::with_capacity(row_count);

        for sample in &self.samples {
            timestamps.push(sample.timestamp.and_utc().timestamp_micros());
            offsets.push(sample.offset_seconds);
            values.push(sample.numeric_intensity());
            raw.push(sample.intensity.as_str());
        }

        let [ts_name, offset_name, lr_name, raw_name] = LR_FRAME_COLUMNS;

        let ts_series = Series::new(ts_name.into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
            .map_err(|source| ParserError::Frame { parser, source })?;

        let cols: Vec<Column> = vec![
            ts_series.into(),
            Series::new(offset_name.into(), offsets).into(),
            Series::new(lr_name.into(), values).into(),
            Series::new(raw_name.into(), raw).into(),
        ];

        DataFrame::new(cols).map_err(|source| ParserError::Frame { parser, source })
    }
}
