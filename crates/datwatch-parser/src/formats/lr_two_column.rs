use chrono::NaiveDateTime;
use tracing::warn;

use crate::errors::ParserError;
use crate::model::{LrLog, LrSample, SkippedLine};

use super::common::{apply_offset, parse_offset_seconds, split_lines};
use super::schema::FIELD_SEPARATOR;

/// Laser-reflectance exports: one `offset<TAB>intensity` pair per line, with
/// offsets in seconds relative to when the file was created.
pub struct LrTwoColumnParser;

impl LrTwoColumnParser {
    pub const NAME: &'static str = "LR_TWO_COLUMN";

    pub fn parse(&self, content: &str, base_time: NaiveDateTime) -> LrLog {
        let mut samples = Vec::new();
        let mut skipped = Vec::new();

        for (line_index, line) in split_lines(content).enumerate() {
            match Self::parse_line(line, line_index, base_time) {
                Ok(Some(sample)) => samples.push(sample),
                Ok(None) => {}
                Err(err) => {
                    let reason = match err {
                        ParserError::DataRow { message, .. } => message,
                        other => other.to_string(),
                    };
                    let skipped_line = SkippedLine {
                        line_index,
                        content: line.trim().to_string(),
                        reason,
                    };
                    warn!("Skipping invalid {skipped_line}");
                    skipped.push(skipped_line);
                }
            }
        }

        LrLog {
            base_time,
            samples,
            skipped,
        }
    }

    /// `Ok(None)` for lines that are not two-field records; those are ignored
    /// without a warning.
    fn parse_line(
        line: &str,
        line_index: usize,
        base_time: NaiveDateTime,
    ) -> Result<Option<LrSample>, ParserError> {
        let fields: Vec<&str> = line.trim().split(FIELD_SEPARATOR).collect();
        let [offset_field, intensity] = fields.as_slice() else {
            return Ok(None);
        };

        let data_row = |message: String| ParserError::DataRow {
            parser: Self::NAME,
            line_index,
            message,
        };

        let offset_seconds = parse_offset_seconds(offset_field).map_err(data_row)?;
        let timestamp = apply_offset(base_time, offset_seconds).map_err(data_row)?;

        Ok(Some(LrSample {
            line_index,
            offset_seconds,
            timestamp,
            intensity: (*intensity).to_string(),
        }))
    }
}
