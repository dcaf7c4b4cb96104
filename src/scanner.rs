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

//! Non-recursive, stack-based pre-order walk of a source tree, yielding one
//! `(DirRecord, Vec<FileRecord>)` tuple per directory. Built as an `Iterator`
//! so it composes with the catalog's `ingest`.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::catalog::{DirRecord, FileRecord};
use crate::error::ScanError;
use crate::warning;

/// Compiles the substring-matched exclude patterns used by the scanner.
pub struct Excludes {
    patterns: Vec<Regex>,
}

impl Excludes {
    pub fn compile(patterns: &[String]) -> Result<Self, ScanError> {
        let compiled = patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| ScanError::BadExcludePattern(p.clone(), e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns: compiled })
    }

    pub fn empty() -> Self {
        Self { patterns: Vec::new() }
    }

    /// True if `path` contains a substring matched by any exclude pattern.
    pub fn matches(&self, path: &Path) -> bool {
        let as_str = path.to_string_lossy();
        self.patterns.iter().any(|re| re.is_match(&as_str))
    }
}

fn mtime_seconds(meta: &fs::Metadata) -> f64 {
    meta.mtime() as f64 + (meta.mtime_nsec() as f64) / 1_000_000_000.0
}

fn dir_record(path: &Path, meta: &fs::Metadata) -> DirRecord {
    DirRecord {
        path: path.to_string_lossy().into_owned(),
        mtime: mtime_seconds(meta),
        inode: meta.ino() as i64,
    }
}

fn file_record(dir: &Path, name: &str, meta: &fs::Metadata) -> FileRecord {
    let is_symlink = meta.file_type().is_symlink();
    FileRecord {
        path: dir.to_string_lossy().into_owned(),
        name: name.to_string(),
        mtime: mtime_seconds(meta),
        size: meta.len(),
        is_symlink,
        is_file: !is_symlink && meta.file_type().is_file(),
        inode: meta.ino() as i64,
    }
}

/// An iterator that lazily walks `root`, applying `excludes`, and yields one
/// tuple per directory in pre-order.
pub struct Scanner {
    excludes: Excludes,
    stack: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(root: &Path, excludes: Excludes) -> Result<Self, ScanError> {
        let meta = fs::symlink_metadata(root).map_err(|_| ScanError::InvalidRoot(root.to_path_buf()))?;
        if !meta.is_dir() {
            return Err(ScanError::InvalidRoot(root.to_path_buf()));
        }
        Ok(Self {
            excludes,
            stack: vec![root.to_path_buf()],
        })
    }

    fn visit(&mut self, dir: &Path) -> Option<(DirRecord, Vec<FileRecord>)> {
        let dir_meta = match fs::symlink_metadata(dir) {
            Ok(m) => m,
            Err(e) => {
                warning!("failed to stat directory '{}': {e}", dir.display());
                return None;
            }
        };

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warning!("failed to read directory '{}': {e}", dir.display());
                return Some((dir_record(dir, &dir_meta), Vec::new()));
            }
        };

        let mut files = Vec::new();
        let mut subdirs: Vec<(PathBuf, fs::Metadata)> = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warning!("failed to read an entry of '{}': {e}", dir.display());
                    continue;
                }
            };
            let path = entry.path();

            if self.excludes.matches(&path) {
                crate::verbose_1!("excluding '{}'", path.display());
                continue;
            }

            let meta = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    warning!("failed to stat '{}': {e}", path.display());
                    continue;
                }
            };

            if meta.is_dir() {
                subdirs.push((path, meta));
            } else {
                let name = entry.file_name().to_string_lossy().into_owned();
                files.push(file_record(dir, &name, &meta));
            }
        }

        files.sort_by_key(|f| f.inode);
        subdirs.sort_by_key(|(_, m)| m.ino());

        for (path, meta) in subdirs.into_iter().rev() {
            if meta.file_type().is_symlink() {
                continue;
            }
            if !has_read_execute(&meta) {
                warning!("skipping unreadable directory '{}'", path.display());
                continue;
            }
            self.stack.push(path);
        }

        Some((dir_record(dir, &dir_meta), files))
    }
}

#[cfg(unix)]
fn has_read_execute(meta: &fs::Metadata) -> bool {
    // A conservative proxy for "the current process can enter and list this
    // directory": world, group, or owner read+execute bits set. A precise
    // check would compare against the running uid/gid; this mirrors the
    // original best-effort permission probe rather than shelling out to
    // `access(2)` semantics exactly.
    let mode = meta.mode();
    let owner_ok = mode & 0o500 == 0o500;
    let group_ok = mode & 0o050 == 0o050;
    let other_ok = mode & 0o005 == 0o005;
    owner_ok || group_ok || other_ok
}

impl Iterator for Scanner {
    type Item = (DirRecord, Vec<FileRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(dir) = self.stack.pop() {
            if let Some(result) = self.visit(&dir) {
                return Some(result);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn test_scans_nested_tree_in_pre_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::write(root.join("sub/b.txt"), b"world").unwrap();

        let scanner = Scanner::new(root, Excludes::empty()).unwrap();
        let results: Vec<_> = scanner.collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.path, root.to_string_lossy());
        let total_files: usize = results.iter().map(|(_, files)| files.len()).sum();
        assert_eq!(total_files, 2);
    }

    #[test]
    fn test_excludes_substring_match() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache/x"), b"x").unwrap();
        fs::write(root.join("keep.txt"), b"keep").unwrap();

        let excludes = Excludes::compile(&[String::from(r"\.cache")]).unwrap();
        let scanner = Scanner::new(root, excludes).unwrap();
        let results: Vec<_> = scanner.collect();

        let all_files: Vec<_> = results.iter().flat_map(|(_, f)| f.iter()).collect();
        assert!(all_files.iter().all(|f| f.name != "x"));
        assert!(all_files.iter().any(|f| f.name == "keep.txt"));
    }

    #[test]
    fn test_invalid_root_fails_fast() {
        let result = Scanner::new(Path::new("/nonexistent/path/for/sure"), Excludes::empty());
        assert!(result.is_err());
    }

    #[test]
    fn test_files_sorted_by_inode_ascending() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("z.txt"), b"z").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();

        let scanner = Scanner::new(root, Excludes::empty()).unwrap();
        let (_, files) = scanner.into_iter().next().unwrap();
        let inodes: Vec<_> = files.iter().map(|f| f.inode).collect();
        let mut sorted = inodes.clone();
        sorted.sort();
        assert_eq!(inodes, sorted);
    }

    #[test]
    fn test_symlink_to_dir_is_treated_as_file_entry() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("real")).unwrap();
        symlink(root.join("real"), root.join("link")).unwrap();

        let scanner = Scanner::new(root, Excludes::empty()).unwrap();
        let results: Vec<_> = scanner.collect();
        // Only `real` is recursed into; the walk never descends through `link`.
        assert_eq!(results.len(), 2);
        let (_, root_files) = &results[0];
        assert!(root_files.iter().any(|f| f.name == "link" && f.is_symlink));
    }
}
