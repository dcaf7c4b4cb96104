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

use std::time::Duration;

use crate::util::size;

// -- Concurrency --
pub const DEFAULT_READ_CONCURRENCY: usize = 1;
pub const DEFAULT_WRITE_CONCURRENCY: usize = 1;

// -- Queues --
pub const INPUT_QUEUE_CAPACITY: usize = 100;
pub const CHUNK_QUEUE_CAPACITY: usize = 25;
pub const QUEUE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

// -- Chunking --
/// Size of a single part read from / written to a regular file.
pub const PART_SIZE: u64 = 64 * size::KiB;
/// Maximum number of bytes buffered into one pipeline chunk (80 parts).
pub const CHUNK_SIZE: u64 = 5 * size::MiB;
/// Parts per chunk, derived from CHUNK_SIZE / PART_SIZE.
pub const PARTS_PER_CHUNK: usize = (CHUNK_SIZE / PART_SIZE) as usize;

// -- Catalog --
pub const CATALOG_FILE_NAME: &str = "index.sqlite3";
pub const CATALOG_ARCHIVE_NAME: &str = "index.sqlite3.gz";
pub const CATALOG_STAGING_BATCH: usize = 256;

// -- Snapshot --
pub const IN_PROGRESS_SUFFIX: &str = "-in-progress";

// -- Display --
pub const DEFAULT_VERBOSITY: u32 = 1;

pub const PROGRESS_REFRESH_RATE_HZ: u32 = 10;
pub const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";
