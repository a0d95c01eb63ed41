mod common;
mod lr_two_column;
pub mod schema;

pub use common::{decode_lossy, format_epic_timestamp, parse_optional_f64};
pub use lr_two_column::LrTwoColumnParser;
