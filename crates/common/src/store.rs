// OpScan - zkEVM Opcode Compatibility Scanner
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! On-disk JSON stores and the data directory layout.
//!
//! Stores are loaded once at open, mutated in memory by the orchestrating
//! task only, and flushed synchronously at checkpoints (after each processed
//! unit or opcode). A flush writes a temp file and renames it into place, so
//! a crash loses at most the current unit's progress, never a prior flush.

use eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Data directory layout for one network's artifacts.
///
/// All pipeline stages agree on file names through this type; the names are
/// part of the on-disk interface and survive across runs.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Data directory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the user's home directory:
    /// `~/.opscan/<network_dir>`, falling back to a relative path when no
    /// home directory is available.
    pub fn default_for(network_dir: &str) -> Self {
        let root = dirs_next::home_dir()
            .map(|home| home.join(".opscan"))
            .unwrap_or_else(|| PathBuf::from("."));
        Self { root: root.join(network_dir) }
    }

    /// The directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding downloaded transaction units.
    pub fn transactions_dir(&self) -> PathBuf {
        self.root.join("transactions")
    }

    /// The contract index artifact.
    pub fn contracts_file(&self) -> PathBuf {
        self.root.join("contracts.json")
    }

    /// The no-contract cache artifact.
    pub fn no_contracts_file(&self) -> PathBuf {
        self.root.join("no_contracts.json")
    }

    /// The aggregated opcode index artifact.
    pub fn opcodes_file(&self) -> PathBuf {
        self.root.join("opcodes.json")
    }

    /// The candidate conflict artifact.
    pub fn conflicts_file(&self) -> PathBuf {
        self.root.join("conflicts.json")
    }

    /// Confirmed issues for the unsupported direction.
    pub fn reverted_file(&self) -> PathBuf {
        self.root.join("reverted.json")
    }

    /// Confirmed issues for the changed direction.
    pub fn changed_file(&self) -> PathBuf {
        self.root.join("changed.json")
    }

    /// The persistent trace cache artifact.
    pub fn trace_cache_file(&self) -> PathBuf {
        self.root.join("trace_cache.json")
    }
}

/// A JSON-backed store for one persisted artifact.
///
/// `open` loads the existing file or starts from `T::default()`; `flush`
/// persists the current in-memory state atomically. There is no merge step:
/// exactly one process owns an artifact at a time.
#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    data: T,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Open the store at `path`, loading existing contents if present.
    ///
    /// An unreadable or unparseable file is logged and replaced by an empty
    /// store rather than failing the run; the next flush overwrites it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(data) => {
                        debug!("Loaded store from {}", path.display());
                        data
                    }
                    Err(e) => {
                        warn!("Failed to parse {}, starting empty: {}", path.display(), e);
                        T::default()
                    }
                },
                Err(e) => {
                    warn!("Failed to read {}, starting empty: {}", path.display(), e);
                    T::default()
                }
            }
        } else {
            debug!("No existing store at {}, starting empty", path.display());
            T::default()
        };

        Self { path, data }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Immutable view of the stored data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Mutable view of the stored data. Changes are not persisted until
    /// [`JsonStore::flush`] is called.
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Persist the current state via temp file + rename.
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_file = self.path.with_extension("tmp");
        let content = serde_json::to_string(&self.data)?;

        fs::write(&temp_file, &content)?;
        fs::rename(&temp_file, &self.path)?; // atomic on most filesystems

        info!("Flushed store to {}", self.path.display());
        Ok(())
    }
}

/// Serialize `data` to `path` via temp file + rename.
///
/// Used for write-once artifacts (downloaded units, result maps) that do not
/// need a long-lived store handle.
pub fn dump_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_file = path.with_extension("tmp");
    fs::write(&temp_file, serde_json::to_string(data)?)?;
    fs::rename(&temp_file, path)?;

    info!("Saved {}", path.display());
    Ok(())
}

/// Load a JSON artifact from `path`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
