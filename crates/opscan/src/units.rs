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

//! Downloaded unit files: naming, discovery and resume point.
//!
//! A unit is one JSON file holding every transaction of a contiguous batch
//! range, named `from_batch_<start:010>_to_<end:010>.json`. Zero-padding
//! makes lexicographic file order equal batch order, which both resume and
//! reporting rely on.

use eyre::Result;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// File name for the unit covering `start..=end`.
pub fn unit_file_name(start: u64, end: u64) -> String {
    format!("from_batch_{start:010}_to_{end:010}.json")
}

/// Parse `(start, end)` out of a unit file name.
pub fn parse_unit_range(name: &str) -> Option<(u64, u64)> {
    let rest = name.strip_prefix("from_batch_")?.strip_suffix(".json")?;
    let (start, end) = rest.split_once("_to_")?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// All unit files under `dir`, sorted by name (and therefore batch order).
pub fn sorted_unit_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| parse_unit_range(n).is_some()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Determine where a download run should resume.
///
/// The most recent unit may be partial (the previous run can have died while
/// writing it), so it is deleted and its first batch becomes the resume
/// point. An empty directory starts from batch 0.
pub fn resume_point(dir: &Path) -> Result<u64> {
    let files = sorted_unit_files(dir)?;
    let Some(last) = files.last() else {
        return Ok(0);
    };

    let start = last
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_unit_range)
        .map(|(start, _)| start)
        .unwrap_or(0);

    info!(file = %last.display(), start, "Discarding last unit and resuming from its first batch");
    fs::remove_file(last)?;
    Ok(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unit_file_name_roundtrip() {
        let name = unit_file_name(0, 9999);
        assert_eq!(name, "from_batch_0000000000_to_0000009999.json");
        assert_eq!(parse_unit_range(&name), Some((0, 9999)));

        assert_eq!(parse_unit_range("contracts.json"), None);
        assert_eq!(parse_unit_range("from_batch_12_to_34.txt"), None);
    }

    #[test]
    fn test_sorted_unit_files_ignores_strangers() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(unit_file_name(10000, 19999)), "[]").unwrap();
        fs::write(temp.path().join(unit_file_name(0, 9999)), "[]").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();

        let files = sorted_unit_files(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with(unit_file_name(0, 9999)));
        assert!(files[1].ends_with(unit_file_name(10000, 19999)));
    }

    #[test]
    fn test_resume_point_discards_last_unit() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(unit_file_name(0, 9999)), "[]").unwrap();
        fs::write(temp.path().join(unit_file_name(10000, 19999)), "[]").unwrap();

        let start = resume_point(temp.path()).unwrap();
        assert_eq!(start, 10000);
        // The partial unit is gone, the complete one stays
        assert!(!temp.path().join(unit_file_name(10000, 19999)).exists());
        assert!(temp.path().join(unit_file_name(0, 9999)).exists());
    }

    #[test]
    fn test_resume_point_empty_dir() {
        let temp = TempDir::new().unwrap();
        assert_eq!(resume_point(temp.path()).unwrap(), 0);
    }
}
