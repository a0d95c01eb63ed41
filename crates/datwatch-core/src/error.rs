// crates/datwatch-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("File I/O error on '{}': {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parsing failed: {0}")]
    Parse(#[from] datwatch_parser::ParserError),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
