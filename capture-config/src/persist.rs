//! Atomic JSON file helpers
//!
//! Writes go to a temp file created in the destination directory, which is
//! synced and then renamed over the destination. If anything fails the temp
//! file is removed and the destination keeps its previous content.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{ConfigError, Result};

/// Serialize `value` as pretty JSON and atomically replace `path` with it
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let persist_err = |source: io::Error| ConfigError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = parent_dir(path);
    fs::create_dir_all(&dir).map_err(persist_err)?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(persist_err)?;
    serde_json::to_writer_pretty(&mut tmp, value)
        .map_err(io::Error::from)
        .map_err(persist_err)?;
    tmp.write_all(b"\n").map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;

    // Dropping the PersistError drops the temp file, which deletes it
    tmp.persist(path).map_err(|e| persist_err(e.error))?;

    tracing::debug!("Persisted {}", path.display());
    Ok(())
}

/// Read and parse `path`; `Ok(None)` when the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Load {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
