pub mod errors;
pub mod formats;
pub mod model;

use chrono::NaiveDateTime;

pub use errors::ParserError;
pub use formats::{decode_lossy, format_epic_timestamp, parse_optional_f64, LrTwoColumnParser};
pub use model::{LrLog, LrSample, SkippedLine};

/// Parses the text of an LR `.dat` export. Offsets are resolved against
/// `base_time`; malformed offsets are reported in [`LrLog::skipped`].
pub fn parse_lr_dat(content: &str, base_time: NaiveDateTime) -> LrLog {
    LrTwoColumnParser.parse(content, base_time)
}
