use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failed on '{}': {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger '{}' is corrupt: {}", path.display(), source)]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub mtime_micros: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Last processed modification time (and optionally content hash) per file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedLedger {
    entries: BTreeMap<PathBuf, ProcessedEntry>,
}

impl ProcessedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&ProcessedEntry> {
        self.entries.get(path)
    }

    /// True if `mtime` is strictly newer than what was last processed for `path`.
    pub fn is_newer(&self, path: &Path, mtime: SystemTime) -> bool {
        let last = self.entries.get(path).map_or(0, |entry| entry.mtime_micros);
        system_time_to_micros(mtime) > last
    }

    pub fn record(&mut self, path: &Path, mtime: SystemTime, content_hash: Option<String>) {
        self.entries.insert(
            path.to_path_buf(),
            ProcessedEntry {
                mtime_micros: system_time_to_micros(mtime),
                content_hash,
            },
        );
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes to a sibling temporary file and renames it over `path`.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = serde_json::to_vec_pretty(self)?;
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, bytes).map_err(io_err)?;
        fs::rename(&tmp_path, path).map_err(io_err)
    }
}

pub fn system_time_to_micros(stamp: SystemTime) -> i64 {
    match stamp.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_micros()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_micros()).unwrap_or(i64::MAX),
    }
}
