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

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while walking a source tree.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("root path '{0}' does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("failed to compile exclude pattern '{0}': {1}")]
    BadExcludePattern(String, regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the catalog (the persistent relational store).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("catalog feeder thread panicked before committing its batch")]
    FeederPanicked,
}

/// Errors raised by the reader/writer copy pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read symlink target at '{0}': {1}")]
    ReadLink(PathBuf, std::io::Error),

    #[error("failed to create symlink '{0}' -> '{1}': {2}")]
    CreateSymlink(PathBuf, PathBuf, std::io::Error),

    #[error("destination '{0}' already exists")]
    DestinationExists(PathBuf),

    #[error("failed to create special node '{0}': {1}")]
    Mknod(PathBuf, std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the snapshot controller.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("backup root '{0}' does not exist")]
    RootMissing(PathBuf),

    #[error("failed to rename in-progress snapshot '{0}' to '{1}': {2}")]
    CommitRename(PathBuf, PathBuf, std::io::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the restore resolver.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("no snapshot selected")]
    NoSnapshotSelected,

    #[error("unknown snapshot timestamp '{0}'")]
    UnknownSnapshot(String),

    #[error("'{0}' was not found in the selected snapshot or any older snapshot")]
    NotFound(PathBuf),

    #[error("destination '{0}' already exists; pass --overwrite to replace it")]
    DestinationExists(PathBuf),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
