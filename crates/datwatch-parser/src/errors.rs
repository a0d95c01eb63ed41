use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("{parser} line {line_index} invalid: {message}")]
    DataRow {
        parser: &'static str,
        line_index: usize,
        message: String,
    },

    #[error("{parser} failed to build frame: {source}")]
    Frame {
        parser: &'static str,
        #[source]
        source: PolarsError,
    },
}
