//! JSON file storage for summaries and the batch cursor.
//!
//! Reads are permissive: a missing or corrupt file loads as empty. Writes go
//! through a temporary file that replaces the target in one rename.

use crate::summary::is_good_summary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Professor name to summary text (or the fallback sentinel).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    entries: BTreeMap<String, String>,
}

impl ResultStore {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, summary: impl Into<String>) {
        self.entries.insert(name.into(), summary.into());
    }

    /// A prior summary that is not the fallback sentinel
    pub fn good_summary(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|s| is_good_summary(s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries holding the fallback sentinel
    pub fn fallback_count(&self) -> usize {
        self.entries.values().filter(|s| !is_good_summary(s)).count()
    }
}

impl FromIterator<(String, String)> for ResultStore {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Where the next bounded batch starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    #[serde(rename = "lastIndex")]
    pub last_index: usize,
}

/// Persistence used by the batch controller.
///
/// Concurrent runs against the same store are not supported; callers must not
/// start two runs on the same files at once.
pub trait StateStore {
    fn load_results(&self) -> ResultStore;
    fn save_results(&self, results: &ResultStore) -> Result<(), StoreError>;
    fn load_cursor(&self) -> CursorState;
    fn save_cursor(&self, cursor: &CursorState) -> Result<(), StoreError>;
}

/// Two JSON documents on local disk
pub struct JsonFileStore {
    results_path: PathBuf,
    state_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(results_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: results_path.into(),
            state_path: state_path.into(),
        }
    }

    /// Store with `summaries.json` and `state.json` inside `dir`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("summaries.json"), dir.join("state.json"))
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

impl StateStore for JsonFileStore {
    fn load_results(&self) -> ResultStore {
        read_or_default(&self.results_path)
    }

    fn save_results(&self, results: &ResultStore) -> Result<(), StoreError> {
        write_json(&self.results_path, results)
    }

    fn load_cursor(&self) -> CursorState {
        read_or_default(&self.state_path)
    }

    fn save_cursor(&self, cursor: &CursorState) -> Result<(), StoreError> {
        write_json(&self.state_path, cursor)
    }
}

fn read_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("{} not readable ({}), starting empty", path.display(), e);
            return T::default();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!("{} is corrupt ({}), starting empty", path.display(), e);
        T::default()
    })
}

/// Pretty-print `value` into a sibling temp file, then rename it over `path`
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_error)?;

    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_error)?;
    tmp.write_all(json.as_bytes()).map_err(io_error)?;
    tmp.write_all(b"\n").map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;
    tmp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
