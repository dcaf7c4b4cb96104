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
use std::sync::Arc;

use crate::catalog::NodeDiff;

/// What kind of node the reader classified a request as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Char,
    Block,
    Fifo,
    Socket,
}

/// A 64 KiB slice of a file's content as seen on the chunk queue: either raw
/// bytes, or a sentinel standing for a zero-filled region the writer should
/// materialise as a hole.
#[derive(Debug, Clone)]
pub enum Part {
    Raw(Vec<u8>),
    Sparse,
}

/// A resolver rewrites a request's `src_file` at read time — used by restore
/// to fall back to older snapshots when a file is absent from the chosen
/// one. Identity for ordinary backups.
pub type SrcResolver = Arc<dyn Fn(&CopyRequest) -> Option<PathBuf> + Send + Sync>;

/// One unit of work submitted to the reader thread.
#[derive(Clone)]
pub struct CopyRequest {
    pub src_dir: PathBuf,
    pub src_file: PathBuf,
    pub dst_file: PathBuf,
    pub size: u64,
    pub is_symlink: bool,
    pub is_file: bool,
    pub src_resolver: Option<SrcResolver>,
    /// How this entry classified against the baseline, for progress
    /// reporting's per-file `+`/`M`/`U` marker (§4.3.1's "status string on
    /// each non-meta chunk"). Restore requests have no add/modify notion of
    /// their own and use `Unchanged`.
    pub diff: NodeDiff,
}

/// A message flowing from the reader to the writer.
#[derive(Clone)]
pub enum Chunk {
    Symlink {
        src_dir: PathBuf,
        dst_file: PathBuf,
        target: PathBuf,
    },
    Special {
        src_dir: PathBuf,
        dst_file: PathBuf,
        kind: SpecialKind,
    },
    File {
        src_dir: PathBuf,
        dst_file: PathBuf,
        data: FileData,
    },
    Meta {
        dst_file: PathBuf,
        src_file: PathBuf,
    },
}

#[derive(Clone)]
pub enum FileData {
    Empty,
    Parts(Vec<Part>),
}
