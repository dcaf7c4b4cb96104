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

//! The two-stage reader/writer copy pipeline described in the project's
//! design notes: a bounded `input_queue` feeds a reader thread, which feeds
//! a bounded `chunk_queue` to a writer thread.

pub mod chunk;
pub mod reader;
pub mod writer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::global::defaults::{CHUNK_QUEUE_CAPACITY, INPUT_QUEUE_CAPACITY};
use crate::pipeline::chunk::{Chunk, CopyRequest};
use crate::pipeline::writer::{DirsNeedStats, WriterStats};
use crate::ui::progress::ProgressReporter;

/// Owns the reader and writer threads and the two bounded channels joining
/// them. One `Pipeline` is built per backup or restore run.
pub struct Pipeline {
    input_tx: crossbeam_channel::Sender<CopyRequest>,
    running: Arc<AtomicBool>,
    dirs_need_stats: DirsNeedStats,
    reader_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<WriterStats>>,
}

impl Pipeline {
    /// Starts the pipeline with no progress reporting, e.g. for tests.
    pub fn start() -> Self {
        Self::start_with_progress(None)
    }

    /// Starts the pipeline, optionally reporting per-file and byte-level
    /// progress to `progress` as the reader streams chunks and the writer
    /// finishes materialising each one (§4.3.1/§4.3.2).
    pub fn start_with_progress(progress: Option<Arc<ProgressReporter>>) -> Self {
        let (input_tx, input_rx) = crossbeam_channel::bounded::<CopyRequest>(INPUT_QUEUE_CAPACITY);
        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded::<Chunk>(CHUNK_QUEUE_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let dirs_need_stats: DirsNeedStats = Arc::new(Mutex::new(Vec::new()));

        let reader_running = running.clone();
        let reader_progress = progress.clone();
        let reader_handle = std::thread::spawn(move || {
            reader::run(input_rx, chunk_tx, reader_running, reader_progress);
        });

        let writer_running = running.clone();
        let writer_dirs = dirs_need_stats.clone();
        let writer_progress = progress.clone();
        let writer_handle =
            std::thread::spawn(move || writer::run(chunk_rx, writer_running, writer_dirs, writer_progress));

        Self {
            input_tx,
            running,
            dirs_need_stats,
            reader_handle: Some(reader_handle),
            writer_handle: Some(writer_handle),
        }
    }

    /// Submits one copy request. Blocks if `input_queue` is full, providing
    /// the back-pressure the design relies on.
    pub fn submit(&self, request: CopyRequest) {
        let _ = self.input_tx.send(request);
    }

    /// Signals both workers to stop once already-enqueued work drains, then
    /// joins them and returns the directories the writer (or `create_tree`)
    /// flagged as needing a metadata replay, plus summary counters.
    ///
    /// `dirs_need_stats` is read only after both threads are joined, so the
    /// ordering itself — not a lock held across the whole run — is what
    /// makes this safe; the mutex exists only to satisfy the brief window
    /// where both threads could still be appending to it concurrently with
    /// each other.
    pub fn drain(mut self) -> (Vec<(std::path::PathBuf, std::path::PathBuf)>, WriterStats) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.input_tx);

        if let Some(h) = self.reader_handle.take() {
            let _ = h.join();
        }
        let writer_stats = match self.writer_handle.take() {
            Some(h) => h.join().unwrap_or(WriterStats {
                files_written: 0,
                symlinks_written: 0,
                specials_written: 0,
            }),
            None => WriterStats {
                files_written: 0,
                symlinks_written: 0,
                specials_written: 0,
            },
        };

        let dirs = std::mem::take(&mut *self.dirs_need_stats.lock());
        (dirs, writer_stats)
    }

    /// Appends a directory the controller itself created (via `create_tree`)
    /// to the shared needs-stats list, the same list the writer appends to
    /// on an implicit `makedirs`.
    pub fn note_dir_needs_stats(&self, dst_dir: std::path::PathBuf, src_dir: std::path::PathBuf) {
        self.dirs_need_stats.lock().push((dst_dir, src_dir));
    }
}
