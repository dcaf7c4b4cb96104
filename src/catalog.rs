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

//! The persistent relational catalog: a baseline/current pair of `dirs`/
//! `files` tables backed by SQLite. Change detection is mtime-equality only,
//! by design — see the module-level notes in the project's DESIGN.md.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use rusqlite::Connection;

use crate::error::CatalogError;
use crate::global::defaults::CATALOG_STAGING_BATCH;

/// A record describing one directory, as captured by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct DirRecord {
    pub path: String,
    pub mtime: f64,
    pub inode: i64,
}

/// A record describing one file (or special node), as captured by the
/// scanner. `path` is the *containing* directory; `name` is the basename.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub mtime: f64,
    pub size: u64,
    pub is_symlink: bool,
    pub is_file: bool,
    pub inode: i64,
}

impl FileRecord {
    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.name)
    }
}

/// Classification of an entry relative to the baseline, used by progress
/// reporting and by tests asserting §8's invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeDiff {
    New,
    Changed,
    Unchanged,
    Deleted,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dirs (
    path  TEXT PRIMARY KEY,
    mtime REAL NOT NULL,
    inode INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS files (
    path  TEXT NOT NULL,
    name  TEXT NOT NULL,
    mtime REAL NOT NULL,
    size  INTEGER NOT NULL,
    is_symlink INTEGER NOT NULL,
    is_file    INTEGER NOT NULL,
    inode INTEGER NOT NULL,
    PRIMARY KEY (path, name)
);
CREATE TABLE IF NOT EXISTS cur_dirs (
    path  TEXT PRIMARY KEY,
    mtime REAL NOT NULL,
    inode INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS cur_files (
    path  TEXT NOT NULL,
    name  TEXT NOT NULL,
    mtime REAL NOT NULL,
    size  INTEGER NOT NULL,
    is_symlink INTEGER NOT NULL,
    is_file    INTEGER NOT NULL,
    inode INTEGER NOT NULL,
    PRIMARY KEY (path, name)
);
CREATE INDEX IF NOT EXISTS idx_files_inode ON files(inode);
CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);
CREATE INDEX IF NOT EXISTS idx_files_mtime ON files(mtime);
CREATE INDEX IF NOT EXISTS idx_cur_files_inode ON cur_files(inode);
CREATE INDEX IF NOT EXISTS idx_cur_files_size ON cur_files(size);
CREATE INDEX IF NOT EXISTS idx_cur_files_mtime ON cur_files(mtime);
CREATE INDEX IF NOT EXISTS idx_dirs_inode ON dirs(inode);
CREATE INDEX IF NOT EXISTS idx_cur_dirs_inode ON cur_dirs(inode);
";

enum StagedNode {
    Dir(DirRecord, Vec<FileRecord>),
}

/// Owns the single background connection that drains staged ingest batches.
/// Spawned lazily the first time `ingest` actually has a batch to hand off,
/// mirroring the feeder the original scanner-to-database bridge used to
/// overlap disk scanning with database writes.
struct Feeder {
    handle: Option<JoinHandle<rusqlite::Result<()>>>,
    sender: Option<mpsc::Sender<Vec<StagedNode>>>,
}

impl Feeder {
    fn spawn(db_path: PathBuf) -> rusqlite::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Vec<StagedNode>>();
        let conn = Connection::open(&db_path)?;
        let handle = std::thread::spawn(move || -> rusqlite::Result<()> {
            while let Ok(batch) = receiver.recv() {
                let tx = conn.unchecked_transaction()?;
                for node in batch {
                    let StagedNode::Dir(dir, files) = node;
                    tx.execute(
                        "INSERT OR REPLACE INTO cur_dirs (path, mtime, inode) VALUES (?1, ?2, ?3)",
                        rusqlite::params![dir.path, dir.mtime, dir.inode],
                    )?;
                    for file in &files {
                        tx.execute(
                            "INSERT OR REPLACE INTO cur_files
                             (path, name, mtime, size, is_symlink, is_file, inode)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            rusqlite::params![
                                file.path,
                                file.name,
                                file.mtime,
                                file.size as i64,
                                file.is_symlink,
                                file.is_file,
                                file.inode,
                            ],
                        )?;
                    }
                }
                tx.commit()?;
            }
            Ok(())
        });
        Ok(Self {
            handle: Some(handle),
            sender: Some(sender),
        })
    }

    fn send(&self, batch: Vec<StagedNode>) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(batch);
        }
    }

    fn join(mut self) -> Result<(), CatalogError> {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| CatalogError::FeederPanicked)??;
        }
        Ok(())
    }
}

pub struct Catalog {
    conn: Connection,
    db_path: PathBuf,
}

impl Catalog {
    /// Opens (creating if necessary) the catalog at `db_path`. The current
    /// tables are truncated and the file vacuumed, matching "on open, the
    /// current tables are truncated and the store is vacuumed."
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("DELETE FROM cur_dirs; DELETE FROM cur_files; VACUUM;")?;
        Ok(Self { conn, db_path })
    }

    /// Opens an in-memory catalog, handy for tests that don't care about the
    /// on-disk artifact.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            db_path: PathBuf::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Ingests the scanner's lazy sequence of `(dir, files)` tuples. Rows
    /// are staged in memory and handed off in batches to a lazily spawned
    /// background feeder so disk scanning and database writes overlap.
    pub fn ingest<I>(&mut self, nodes: I) -> Result<(), CatalogError>
    where
        I: IntoIterator<Item = (DirRecord, Vec<FileRecord>)>,
    {
        let mut feeder: Option<Feeder> = None;
        let mut staged = Vec::with_capacity(CATALOG_STAGING_BATCH);

        for (dir, mut files) in nodes {
            files.sort_by_key(|f| f.inode);
            staged.push(StagedNode::Dir(dir, files));

            if staged.len() >= CATALOG_STAGING_BATCH {
                let feeder = feeder.get_or_insert_with(|| {
                    Feeder::spawn(self.db_path.clone()).expect("feeder connection")
                });
                feeder.send(std::mem::take(&mut staged));
            }
        }

        match feeder {
            Some(feeder) => {
                if !staged.is_empty() {
                    feeder.send(staged);
                }
                feeder.join()?;
            }
            None => {
                // Small enough run that the feeder was never worth spawning;
                // insert directly on the caller's own connection.
                let tx = self.conn.transaction()?;
                for node in staged {
                    let StagedNode::Dir(dir, files) = node;
                    tx.execute(
                        "INSERT OR REPLACE INTO cur_dirs (path, mtime, inode) VALUES (?1, ?2, ?3)",
                        rusqlite::params![dir.path, dir.mtime, dir.inode],
                    )?;
                    for file in &files {
                        tx.execute(
                            "INSERT OR REPLACE INTO cur_files
                             (path, name, mtime, size, is_symlink, is_file, inode)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            rusqlite::params![
                                file.path,
                                file.name,
                                file.mtime,
                                file.size as i64,
                                file.is_symlink,
                                file.is_file,
                                file.inode,
                            ],
                        )?;
                    }
                }
                tx.commit()?;
            }
        }

        Ok(())
    }

    fn query_files(&self, sql: &str) -> Result<Vec<FileRecord>, CatalogError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(FileRecord {
                path: row.get(0)?,
                name: row.get(1)?,
                mtime: row.get(2)?,
                size: row.get::<_, i64>(3)? as u64,
                is_symlink: row.get(4)?,
                is_file: row.get(5)?,
                inode: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn query_dirs(&self, sql: &str) -> Result<Vec<DirRecord>, CatalogError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(DirRecord {
                path: row.get(0)?,
                mtime: row.get(1)?,
                inode: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn added_files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_files(
            "SELECT cur.path, cur.name, cur.mtime, cur.size, cur.is_symlink, cur.is_file, cur.inode
             FROM cur_files cur LEFT JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime IS NULL
             ORDER BY cur.inode ASC",
        )
    }

    pub fn modified_files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_files(
            "SELECT cur.path, cur.name, cur.mtime, cur.size, cur.is_symlink, cur.is_file, cur.inode
             FROM cur_files cur LEFT JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime IS NOT NULL AND base.mtime != cur.mtime
             ORDER BY cur.inode ASC",
        )
    }

    pub fn added_or_modified_files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_files(
            "SELECT cur.path, cur.name, cur.mtime, cur.size, cur.is_symlink, cur.is_file, cur.inode
             FROM cur_files cur LEFT JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime IS NULL OR base.mtime != cur.mtime
             ORDER BY cur.inode ASC",
        )
    }

    pub fn unmodified_files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_files(
            "SELECT cur.path, cur.name, cur.mtime, cur.size, cur.is_symlink, cur.is_file, cur.inode
             FROM cur_files cur JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime = cur.mtime",
        )
    }

    pub fn added_dirs(&self) -> Result<Vec<DirRecord>, CatalogError> {
        self.query_dirs(
            "SELECT cur.path, cur.mtime, cur.inode
             FROM cur_dirs cur LEFT JOIN dirs base ON cur.path = base.path
             WHERE base.mtime IS NULL",
        )
    }

    pub fn modified_dirs(&self) -> Result<Vec<DirRecord>, CatalogError> {
        self.query_dirs(
            "SELECT cur.path, cur.mtime, cur.inode
             FROM cur_dirs cur LEFT JOIN dirs base ON cur.path = base.path
             WHERE base.mtime IS NOT NULL AND base.mtime != cur.mtime",
        )
    }

    pub fn added_or_modified_dirs(&self) -> Result<Vec<DirRecord>, CatalogError> {
        self.query_dirs(
            "SELECT cur.path, cur.mtime, cur.inode
             FROM cur_dirs cur LEFT JOIN dirs base ON cur.path = base.path
             WHERE base.mtime IS NULL OR base.mtime != cur.mtime",
        )
    }

    /// Baseline rows with no counterpart in `cur_files` — entries that
    /// existed last run and are gone from this scan. Not part of
    /// `num_changed()` (§4.2 defines that gate over added/modified only);
    /// exposed for the final report and for catalog cleanliness checks.
    pub fn deleted_files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_files(
            "SELECT base.path, base.name, base.mtime, base.size, base.is_symlink, base.is_file, base.inode
             FROM files base LEFT JOIN cur_files cur
               ON cur.path = base.path AND cur.name = base.name
             WHERE cur.mtime IS NULL",
        )
    }

    pub fn deleted_dirs(&self) -> Result<Vec<DirRecord>, CatalogError> {
        self.query_dirs(
            "SELECT base.path, base.mtime, base.inode
             FROM dirs base LEFT JOIN cur_dirs cur ON cur.path = base.path
             WHERE cur.mtime IS NULL",
        )
    }

    pub fn added_bytes(&self) -> Result<u64, CatalogError> {
        self.scalar_u64(
            "SELECT COALESCE(SUM(cur.size), 0)
             FROM cur_files cur LEFT JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime IS NULL",
        )
    }

    pub fn modified_bytes(&self) -> Result<u64, CatalogError> {
        self.scalar_u64(
            "SELECT COALESCE(SUM(cur.size), 0)
             FROM cur_files cur LEFT JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime IS NOT NULL AND base.mtime != cur.mtime",
        )
    }

    pub fn added_or_modified_bytes(&self) -> Result<u64, CatalogError> {
        self.scalar_u64(
            "SELECT COALESCE(SUM(cur.size), 0)
             FROM cur_files cur LEFT JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime IS NULL OR base.mtime != cur.mtime",
        )
    }

    pub fn selected_bytes(&self) -> Result<u64, CatalogError> {
        self.scalar_u64("SELECT COALESCE(SUM(size), 0) FROM cur_files")
    }

    fn scalar_u64(&self, sql: &str) -> Result<u64, CatalogError> {
        let value: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(value as u64)
    }

    /// Count of added-or-modified files plus added-or-modified dirs; the
    /// gate deciding whether a new snapshot is worth creating at all.
    pub fn num_changed(&self) -> Result<u64, CatalogError> {
        let files: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cur_files cur LEFT JOIN files base
               ON cur.path = base.path AND cur.name = base.name
             WHERE base.mtime IS NULL OR base.mtime != cur.mtime",
            [],
            |row| row.get(0),
        )?;
        let dirs: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cur_dirs cur LEFT JOIN dirs base ON cur.path = base.path
             WHERE base.mtime IS NULL OR base.mtime != cur.mtime",
            [],
            |row| row.get(0),
        )?;
        Ok((files + dirs) as u64)
    }

    pub fn cur_stats(&self) -> Result<(u64, u64), CatalogError> {
        let dirs: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cur_dirs", [], |row| row.get(0))?;
        let files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cur_files", [], |row| row.get(0))?;
        Ok((dirs as u64, files as u64))
    }

    /// Promotes `cur_*` into the baseline tables, transactionally. On
    /// failure the baseline from before the call remains intact.
    pub fn commit(&mut self) -> Result<(), CatalogError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM dirs", [])?;
        tx.execute("DELETE FROM files", [])?;
        tx.execute("INSERT INTO dirs SELECT * FROM cur_dirs", [])?;
        tx.execute("INSERT INTO files SELECT * FROM cur_files", [])?;
        tx.execute("DELETE FROM cur_dirs", [])?;
        tx.execute("DELETE FROM cur_files", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Copies every baseline row whose path lies under `subtree_prefix` into
    /// the current tables, repurposing the differential machinery to
    /// enumerate a restore selection.
    pub fn select(&mut self, subtree_prefix: &str) -> Result<(), CatalogError> {
        // A trailing "/%" rather than a bare "%" keeps this from also matching
        // a sibling directory that merely shares the prefix as a string, e.g.
        // "/a" must not select "/ab".
        let like_pattern = if subtree_prefix.ends_with('/') {
            format!("{subtree_prefix}%")
        } else {
            format!("{subtree_prefix}/%")
        };
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO cur_dirs SELECT * FROM dirs WHERE path = ?1 OR path LIKE ?2",
            rusqlite::params![subtree_prefix, like_pattern],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO cur_files SELECT * FROM files
             WHERE path = ?1 OR path LIKE ?2",
            rusqlite::params![subtree_prefix, like_pattern],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// All current-table file rows, ordered by inode, for streaming into the
    /// copy pipeline.
    pub fn selected_files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_files("SELECT path, name, mtime, size, is_symlink, is_file, inode FROM cur_files ORDER BY inode ASC")
    }

    pub fn selected_dirs(&self) -> Result<Vec<DirRecord>, CatalogError> {
        self.query_dirs("SELECT path, mtime, inode FROM cur_dirs ORDER BY inode ASC")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_first_ingest_is_all_added() -> Result<(), CatalogError> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.ingest(vec![(
            dir("/src", 1.0, 1),
            vec![file("/src", "a.txt", 1.0, 5, 2)],
        )])?;

        assert_eq!(catalog.num_changed()?, 2);
        assert_eq!(catalog.added_bytes()?, 5);
        assert_eq!(catalog.modified_files()?.len(), 0);

        catalog.commit()?;
        assert_eq!(catalog.cur_stats()?, (0, 0));

        Ok(())
    }

    #[test]
    fn test_second_identical_ingest_is_noop() -> Result<(), CatalogError> {
        let mut catalog = Catalog::open_in_memory()?;
        let nodes = || {
            vec![(
                dir("/src", 1.0, 1),
                vec![file("/src", "a.txt", 1.0, 5, 2)],
            )]
        };

        catalog.ingest(nodes())?;
        catalog.commit()?;

        catalog.ingest(nodes())?;
        assert_eq!(catalog.num_changed()?, 0);
        assert_eq!(catalog.unmodified_files()?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_mtime_change_marks_modified_not_added() -> Result<(), CatalogError> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.ingest(vec![(
            dir("/src", 1.0, 1),
            vec![file("/src", "a.txt", 1.0, 5, 2)],
        )])?;
        catalog.commit()?;

        catalog.ingest(vec![(
            dir("/src", 1.0, 1),
            vec![file("/src", "a.txt", 2.0, 2, 2)],
        )])?;

        let modified = catalog.modified_files()?;
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].size, 2);
        assert_eq!(catalog.added_files()?.len(), 0);

        Ok(())
    }

    #[test]
    fn test_select_copies_baseline_subtree_into_current() -> Result<(), CatalogError> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.ingest(vec![
            (dir("/a", 1.0, 1), vec![file("/a", "x.txt", 1.0, 1, 2)]),
            (dir("/b", 1.0, 3), vec![file("/b", "y.txt", 1.0, 1, 4)]),
        ])?;
        catalog.commit()?;

        catalog.select("/a")?;
        let files = catalog.selected_files()?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "x.txt");

        Ok(())
    }

    #[test]
    fn test_select_does_not_match_sibling_sharing_a_prefix() -> Result<(), CatalogError> {
        let mut catalog = Catalog::open_in_memory()?;
        catalog.ingest(vec![
            (dir("/a", 1.0, 1), vec![file("/a", "x.txt", 1.0, 1, 2)]),
            (dir("/ab", 1.0, 3), vec![file("/ab", "y.txt", 1.0, 1, 4)]),
        ])?;
        catalog.commit()?;

        catalog.select("/a")?;
        let files = catalog.selected_files()?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "x.txt");

        Ok(())
    }

    #[test]
    fn test_large_ingest_spawns_feeder() -> Result<(), CatalogError> {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("index.sqlite3"))?;

        let nodes = (0..1000).map(|i| {
            (
                self::dir(&format!("/src/{i}"), 1.0, i),
                vec![self::file(&format!("/src/{i}"), "f.txt", 1.0, 1, i * 10)],
            )
        });
        catalog.ingest(nodes)?;

        let (dirs, files) = catalog.cur_stats()?;
        assert_eq!(dirs, 1000);
        assert_eq!(files, 1000);

        Ok(())
    }
}
