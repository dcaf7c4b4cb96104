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

//! The snapshot controller (§4.4): owns the in-progress snapshot directory,
//! the reader/writer pipeline copying into it, and the atomic commit that
//! promotes it to a finished, timestamped snapshot.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::catalog::{Catalog, DirRecord, FileRecord, NodeDiff};
use crate::error::SnapshotError;
use crate::global::defaults::{CATALOG_ARCHIVE_NAME, IN_PROGRESS_SUFFIX};
use crate::pipeline::chunk::CopyRequest;
use crate::pipeline::writer::{copy_metadata, WriterStats};
use crate::pipeline::Pipeline;
use crate::ui::progress::ProgressReporter;
use crate::util::{snapshot_timestamp_now, strip_root};
use crate::warning;
use std::sync::Arc;

/// What a finished run produced: the promoted snapshot directory and the
/// writer's summary counters, used for the CLI's final report.
pub struct CommitOutcome {
    pub snapshot_dir: PathBuf,
    pub stats: WriterStats,
}

pub struct SnapshotController {
    root: PathBuf,
    timestamp: String,
    snapshot_dir: PathBuf,
    pipeline: Option<Pipeline>,
}

impl SnapshotController {
    /// Creates the `<root>/<ts>-in-progress` directory. Sweeps and deletes
    /// any orphaned `-in-progress` directories left by a previously aborted
    /// run first — see the §9 design note resolved in DESIGN.md.
    pub fn create(root: &Path) -> Result<Self, SnapshotError> {
        Self::create_with_progress(root, None)
    }

    /// Same as `create`, but threads `progress` through to the pipeline so
    /// the reader/writer threads report per-file and byte-level status
    /// (§4.3.1/§4.3.2) as they copy.
    pub fn create_with_progress(
        root: &Path,
        progress: Option<Arc<ProgressReporter>>,
    ) -> Result<Self, SnapshotError> {
        if !root.is_dir() {
            return Err(SnapshotError::RootMissing(root.to_path_buf()));
        }

        Self::sweep_orphans(root)?;

        let timestamp = snapshot_timestamp_now();
        let snapshot_dir = root.join(format!("{timestamp}{IN_PROGRESS_SUFFIX}"));
        fs::create_dir_all(&snapshot_dir)?;

        Ok(Self {
            root: root.to_path_buf(),
            timestamp,
            snapshot_dir,
            pipeline: Some(Pipeline::start_with_progress(progress)),
        })
    }

    fn sweep_orphans(root: &Path) -> Result<(), SnapshotError> {
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(IN_PROGRESS_SUFFIX) {
                warning!(
                    "removing orphaned in-progress snapshot '{}'",
                    entry.path().display()
                );
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    fn destination_for(&self, source_path: &Path) -> PathBuf {
        self.snapshot_dir.join(strip_root(source_path))
    }

    /// Materialises every directory under the snapshot root and remembers it
    /// for the later `copy_dir_stats` metadata replay.
    pub fn create_tree(&self, dirs: &[DirRecord]) -> Result<(), SnapshotError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .expect("create_tree called after finish()");
        for dir in dirs {
            let src_dir = PathBuf::from(&dir.path);
            let dst_dir = self.destination_for(&src_dir);
            fs::create_dir_all(&dst_dir)?;
            pipeline.note_dir_needs_stats(dst_dir, src_dir);
        }
        Ok(())
    }

    /// Enqueues every file for copy from its source path into the snapshot,
    /// tagged with `diff` for progress reporting's per-file marker. Stops
    /// early (best-effort drain) if a SIGINT has flipped the shared shutdown
    /// flag; whatever was already enqueued still gets copied.
    pub fn copy_files(&self, files: &[FileRecord], diff: NodeDiff) {
        let pipeline = self
            .pipeline
            .as_ref()
            .expect("copy_files called after finish()");
        for file in files {
            if crate::global::shutdown_requested() {
                break;
            }
            let src_file = file.full_path();
            let dst_file = self.destination_for(&src_file);
            pipeline.submit(CopyRequest {
                src_dir: PathBuf::from(&file.path),
                src_file,
                dst_file,
                size: file.size,
                is_symlink: file.is_symlink,
                is_file: file.is_file,
                src_resolver: None,
                diff,
            });
        }
    }

    /// Opt-in hard-link optimisation (§9, not wired into the default CLI
    /// flow): for every unmodified regular file, attempts to hard-link the
    /// prior snapshot's copy into this one instead of re-reading it from the
    /// (possibly slow or removed) source. Files that fail to link — missing
    /// from the prior snapshot, or a cross-device prior root — are returned
    /// so the caller can fall back to `copy_missing_files`.
    pub fn link_old_files(
        &self,
        files: &[FileRecord],
        prior_snapshot_dir: &Path,
    ) -> Vec<FileRecord> {
        let pipeline = self
            .pipeline
            .as_ref()
            .expect("link_old_files called after finish()");
        let mut missing = Vec::new();

        for file in files {
            if file.is_symlink || !file.is_file {
                missing.push(file.clone());
                continue;
            }

            let rel = strip_root(&file.full_path());
            let dst_file = self.snapshot_dir.join(&rel);
            let prior_file = prior_snapshot_dir.join(&rel);

            if let Some(parent) = dst_file.parent() {
                if !parent.exists() {
                    if fs::create_dir_all(parent).is_ok() {
                        pipeline.note_dir_needs_stats(parent.to_path_buf(), PathBuf::from(&file.path));
                    }
                }
            }

            match fs::hard_link(&prior_file, &dst_file) {
                Ok(()) => continue,
                Err(_) => missing.push(file.clone()),
            }
        }

        missing
    }

    pub fn sum_missing_bytes(missing: &[FileRecord]) -> u64 {
        missing.iter().map(|f| f.size).sum()
    }

    /// Re-queues files that couldn't be hard-linked for a direct copy from
    /// source, through the same pipeline as everything else.
    pub fn copy_missing_files(&self, missing: &[FileRecord]) {
        self.copy_files(missing, NodeDiff::Unchanged);
    }

    /// Drains the copy pipeline, then replays metadata bottom-up onto every
    /// directory the writer or `create_tree` flagged as needing it — both
    /// the directories named by the scanner and any ancestor the writer had
    /// to create implicitly via `makedirs`.
    fn drain_and_stat_dirs(&mut self) -> Result<WriterStats, SnapshotError> {
        let pipeline = self
            .pipeline
            .take()
            .expect("drain_and_stat_dirs called twice");
        let (dirs_need_stats, stats) = pipeline.drain();

        let mut applied: HashSet<PathBuf> = HashSet::new();
        for (dst_dir, src_dir) in &dirs_need_stats {
            let dst_ancestors = dst_dir.ancestors();
            let src_ancestors = src_dir.ancestors();
            // `dst_dir` is always `snapshot_dir.join(strip_root(src_dir))`, so the
            // two ancestor chains walk in lockstep until `dst` bottoms out at
            // `snapshot_dir` itself; stop there rather than pairing it with an
            // unrelated ancestor of `src_dir` (its filesystem root).
            for (dst, src) in dst_ancestors.zip(src_ancestors) {
                if dst == self.snapshot_dir {
                    break;
                }
                if applied.insert(dst.to_path_buf()) {
                    if let Err(e) = copy_metadata(src, dst) {
                        warning!("failed to copy metadata onto '{}': {e}", dst.display());
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Persists the catalog (now holding this run's baseline) compressed
    /// into the snapshot, then atomically renames the in-progress directory
    /// to its final `<ts>` name. This rename is the commit boundary: once it
    /// succeeds the run is durable; any failure before it leaves the
    /// `-in-progress` directory for a future run (or operator) to deal with.
    pub fn finish(mut self, catalog: &mut Catalog) -> Result<CommitOutcome, SnapshotError> {
        let stats = self.drain_and_stat_dirs()?;

        catalog.commit()?;
        self.persist_catalog(catalog)?;

        let final_dir = self.root.join(&self.timestamp);
        fs::rename(&self.snapshot_dir, &final_dir)
            .map_err(|e| SnapshotError::CommitRename(self.snapshot_dir.clone(), final_dir.clone(), e))?;

        Ok(CommitOutcome {
            snapshot_dir: final_dir,
            stats,
        })
    }

    fn persist_catalog(&self, catalog: &Catalog) -> Result<(), SnapshotError> {
        let raw = fs::read(catalog.path())?;
        let archive_path = self.snapshot_dir.join(CATALOG_ARCHIVE_NAME);
        let file = fs::File::create(&archive_path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&raw)?;
        encoder.finish()?;
        Ok(())
    }
}

/// Decompresses a snapshot's `index.sqlite3.gz` into a plain file at
/// `dest_path`, for the restore flow to open as an ordinary `Catalog`.
pub fn decompress_catalog(snapshot_dir: &Path, dest_path: &Path) -> Result<(), SnapshotError> {
    let archive_path = snapshot_dir.join(CATALOG_ARCHIVE_NAME);
    let compressed = fs::File::open(&archive_path)?;
    let mut decoder = flate2::read::GzDecoder::new(compressed);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    fs::write(dest_path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
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
    fn test_create_sweeps_orphaned_in_progress_dirs() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("1700000000.0000000-in-progress")).unwrap();

        let controller = SnapshotController::create(root.path()).unwrap();
        drop(controller);

        let remaining: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(IN_PROGRESS_SUFFIX))
            .collect();
        assert_eq!(remaining.len(), 1, "the new run's own dir should remain");
    }

    #[test]
    fn test_full_run_commits_and_renames() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"hello").unwrap();

        let src_meta = fs::symlink_metadata(src.path().join("a.txt")).unwrap();
        let mut catalog = Catalog::open(root.path().join("catalog.sqlite3")).unwrap();

        use std::os::unix::fs::MetadataExt;
        catalog
            .ingest(vec![(
                dir(&src.path().to_string_lossy(), 1.0, 1),
                vec![file(
                    &src.path().to_string_lossy(),
                    "a.txt",
                    src_meta.mtime() as f64,
                    5,
                    src_meta.ino() as i64,
                )],
            )])
            .unwrap();

        let controller = SnapshotController::create(root.path()).unwrap();
        controller
            .create_tree(&[dir(&src.path().to_string_lossy(), 1.0, 1)])
            .unwrap();
        controller.copy_files(&catalog.added_or_modified_files().unwrap(), NodeDiff::New);

        let outcome = controller.finish(&mut catalog).unwrap();
        assert!(!outcome.snapshot_dir.to_string_lossy().ends_with(IN_PROGRESS_SUFFIX));
        assert_eq!(outcome.stats.files_written, 1);

        let restored = outcome
            .snapshot_dir
            .join(strip_root(&src.path().join("a.txt")));
        assert_eq!(fs::read(&restored).unwrap(), b"hello");
        assert!(outcome.snapshot_dir.join(CATALOG_ARCHIVE_NAME).exists());
    }
}
