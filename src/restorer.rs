// cairn is an incremental backup tool
// Copyright (C) 2025  Javier Lancha Vázquez <javier.lancha@gmail.com>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The restore resolver (§4.5): enumerates selectable snapshot timestamps,
//! selects catalog rows under requested subtrees, and builds the path
//! resolver that lets the copy pipeline transparently read a file from an
//! older snapshot when it's absent from the chosen one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{Catalog, DirRecord, FileRecord, NodeDiff};
use crate::error::RestoreError;
use crate::pipeline::chunk::{CopyRequest, SrcResolver};
use crate::pipeline::writer::copy_metadata;
use crate::snapshot::decompress_catalog;
use crate::util::{parse_snapshot_timestamp, strip_root};
use crate::warning;

pub struct RestoreResolver {
    root: PathBuf,
    /// Every committed snapshot's timestamp, ascending.
    timestamps: Vec<String>,
}

/// The chosen snapshot's catalog decompressed to a scratch file outside any
/// snapshot directory, so `rusqlite` can open it directly; removed on drop
/// regardless of how `select()` returns.
struct TempCatalogFile {
    path: PathBuf,
}

impl TempCatalogFile {
    fn new(ts: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "cairn-restore-catalog-{}-{ts}.sqlite3",
            std::process::id()
        ));
        Self { path }
    }
}

impl Drop for TempCatalogFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl RestoreResolver {
    /// Enumerates `root` for committed snapshot directories (anything whose
    /// name parses as a snapshot timestamp; `-in-progress` directories never
    /// match and are correctly excluded from restore).
    pub fn discover(root: &Path) -> Result<Self, RestoreError> {
        let mut found: Vec<(f64, String)> = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(value) = parse_snapshot_timestamp(&name) {
                found.push((value, name));
            }
        }
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self {
            root: root.to_path_buf(),
            timestamps: found.into_iter().map(|(_, name)| name).collect(),
        })
    }

    pub fn latest(&self) -> Option<&str> {
        self.timestamps.last().map(String::as_str)
    }

    /// Resolves an optionally-requested timestamp string against the known
    /// snapshots, defaulting to the latest when `None`.
    pub fn resolve_timestamp(&self, requested: Option<&str>) -> Result<String, RestoreError> {
        match requested {
            Some(ts) => {
                if self.timestamps.iter().any(|t| t == ts) {
                    Ok(ts.to_string())
                } else {
                    Err(RestoreError::UnknownSnapshot(ts.to_string()))
                }
            }
            None => self
                .latest()
                .map(str::to_string)
                .ok_or(RestoreError::NoSnapshotSelected),
        }
    }

    pub fn snapshot_dir(&self, ts: &str) -> PathBuf {
        self.root.join(ts)
    }

    /// `ts` and every strictly older timestamp, descending — the search
    /// order both `resolver()` and `copy_dir_stats()` walk.
    fn candidates_at_or_before(&self, ts: &str) -> Vec<String> {
        let mut candidates: Vec<String> = self
            .timestamps
            .iter()
            .filter(|t| t.as_str() <= ts)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.cmp(a));
        candidates
    }

    /// Decompresses the chosen snapshot's catalog and selects every baseline
    /// row under any of `subtree_prefixes`.
    pub fn select(
        &self,
        ts: &str,
        subtree_prefixes: &[String],
    ) -> Result<(Vec<FileRecord>, Vec<DirRecord>), RestoreError> {
        let tmp = TempCatalogFile::new(ts);
        decompress_catalog(&self.snapshot_dir(ts), &tmp.path)?;

        let mut catalog = Catalog::open(&tmp.path)?;
        for prefix in subtree_prefixes {
            catalog.select(prefix)?;
        }

        let files = catalog.selected_files()?;
        let dirs = catalog.selected_dirs()?;
        Ok((files, dirs))
    }

    /// Fails fast if any of `files` cannot be found in the chosen snapshot or
    /// any older one, rather than letting the pipeline silently skip it.
    pub fn verify_all_resolvable(&self, ts: &str, files: &[FileRecord]) -> Result<(), RestoreError> {
        let candidates = self.candidates_at_or_before(ts);
        for file in files {
            let rel = strip_root(&file.full_path());
            let found = candidates
                .iter()
                .any(|c| self.root.join(c).join(&rel).symlink_metadata().is_ok());
            if !found {
                return Err(RestoreError::NotFound(file.full_path()));
            }
        }
        Ok(())
    }

    /// Builds the `src_resolver` closure submitted with every restore
    /// `CopyRequest`: if the request's literal `src_file` (a path inside the
    /// chosen snapshot) doesn't exist, searches strictly older snapshots for
    /// the same relative path and rewrites to the first hit.
    pub fn resolver(&self, ts: &str) -> SrcResolver {
        let chosen_dir = self.snapshot_dir(ts);
        let older: Vec<PathBuf> = self
            .candidates_at_or_before(ts)
            .into_iter()
            .filter(|c| c != ts)
            .map(|c| self.root.join(c))
            .collect();

        Arc::new(move |request: &CopyRequest| {
            if request.src_file.symlink_metadata().is_ok() {
                return None;
            }
            let rel = request.src_file.strip_prefix(&chosen_dir).ok()?;
            for dir in &older {
                let candidate = dir.join(rel);
                if candidate.symlink_metadata().is_ok() {
                    return Some(candidate);
                }
            }
            None
        })
    }

    /// Replays mode/ownership/mtime onto every directory in `dirs`, finding
    /// each one's physical source via the same backward search the file
    /// resolver uses — a directory is only materialised inside the
    /// snapshots where it was itself added or modified.
    pub fn copy_dir_stats(
        &self,
        ts: &str,
        dirs: &[DirRecord],
        dest_root: &Path,
    ) -> Result<(), RestoreError> {
        let candidates = self.candidates_at_or_before(ts);

        let mut records: Vec<&DirRecord> = dirs.iter().collect();
        records.sort_by(|a, b| a.path.len().cmp(&b.path.len()));

        for dir in records {
            let rel = strip_root(Path::new(&dir.path));
            let dest_dir = dest_root.join(&rel);
            if !dest_dir.is_dir() {
                continue;
            }

            let source = candidates
                .iter()
                .map(|c| self.root.join(c).join(&rel))
                .find(|p| p.symlink_metadata().is_ok());

            match source {
                Some(src) => {
                    if let Err(e) = copy_metadata(&src, &dest_dir) {
                        warning!("failed to restore metadata onto '{}': {e}", dest_dir.display());
                    }
                }
                None => warning!(
                    "no snapshot at or before '{ts}' has a physical copy of '{}'; leaving its metadata as created",
                    dir.path
                ),
            }
        }

        Ok(())
    }
}

/// Builds the pipeline requests for a set of selected files, rooted at
/// `target`: the destination a restore run writes into.
pub fn build_copy_requests(
    files: &[FileRecord],
    snapshot_dir: &Path,
    target: &Path,
    resolver: SrcResolver,
) -> Vec<CopyRequest> {
    files
        .iter()
        .map(|file| {
            let rel = strip_root(&file.full_path());
            CopyRequest {
                src_dir: snapshot_dir.join(strip_root(Path::new(&file.path))),
                src_file: snapshot_dir.join(&rel),
                dst_file: target.join(&rel),
                size: file.size,
                is_symlink: file.is_symlink,
                is_file: file.is_file,
                src_resolver: Some(resolver.clone()),
                diff: NodeDiff::Unchanged,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn dir(path: &str, mtime: f64, inode: i64) -> DirRecord {
        DirRecord {
            path: path.to_string(),
            mtime,
            inode,
        }
    }

    fn file(path: &str, name: &str, mtime: f64, size: u64, inode: i64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            name: name.to_string(),
            mtime,
            size,
            is_symlink: false,
            is_file: true,
            inode,
        }
    }

    #[test]
    fn test_discover_orders_timestamps_ascending_and_skips_in_progress() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("1700000002.0000000")).unwrap();
        fs::create_dir(root.path().join("1700000001.0000000")).unwrap();
        fs::create_dir(root.path().join("1700000003.0000000-in-progress")).unwrap();

        let resolver = RestoreResolver::discover(root.path()).unwrap();
        assert_eq!(
            resolver.timestamps,
            vec!["1700000001.0000000", "1700000002.0000000"]
        );
        assert_eq!(resolver.latest(), Some("1700000002.0000000"));
    }

    #[test]
    fn test_resolve_timestamp_rejects_unknown() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("1700000001.0000000")).unwrap();
        let resolver = RestoreResolver::discover(root.path()).unwrap();

        assert!(resolver.resolve_timestamp(Some("1700000001.0000000")).is_ok());
        assert!(matches!(
            resolver.resolve_timestamp(Some("9999999999.0000000")),
            Err(RestoreError::UnknownSnapshot(_))
        ));
    }

    #[test]
    fn test_resolver_falls_back_to_older_snapshot() {
        let root = tempdir().unwrap();
        let old = root.path().join("1700000001.0000000");
        let new = root.path().join("1700000002.0000000");
        fs::create_dir_all(old.join("src")).unwrap();
        fs::create_dir_all(&new).unwrap();
        fs::write(old.join("src/a.txt"), b"hello").unwrap();

        let resolver = RestoreResolver::discover(root.path()).unwrap();
        let resolve = resolver.resolver("1700000002.0000000");

        let request = CopyRequest {
            src_dir: new.join("src"),
            src_file: new.join("src/a.txt"),
            dst_file: PathBuf::from("/tmp/out/a.txt"),
            size: 5,
            is_symlink: false,
            is_file: true,
            src_resolver: None,
            diff: NodeDiff::Unchanged,
        };

        let resolved = resolve(&request).expect("should fall back to the older snapshot");
        assert_eq!(resolved, old.join("src/a.txt"));
    }

    #[test]
    fn test_verify_all_resolvable_flags_missing_file() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("1700000001.0000000")).unwrap();
        let resolver = RestoreResolver::discover(root.path()).unwrap();

        let missing = file("/src", "ghost.txt", 1.0, 1, 1);
        let err = resolver
            .verify_all_resolvable("1700000001.0000000", &[missing])
            .unwrap_err();
        assert!(matches!(err, RestoreError::NotFound(_)));
    }

    #[test]
    fn test_copy_dir_stats_warns_without_panicking_when_source_missing() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("1700000001.0000000")).unwrap();
        let target = tempdir().unwrap();
        fs::create_dir_all(target.path().join("src")).unwrap();

        let resolver = RestoreResolver::discover(root.path()).unwrap();
        let dirs = vec![dir("/src", 1.0, 1)];
        resolver
            .copy_dir_stats("1700000001.0000000", &dirs, target.path())
            .unwrap();
    }
}
