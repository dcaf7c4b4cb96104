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

use std::fs::File;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::global::defaults::{CHUNK_SIZE, PARTS_PER_CHUNK, PART_SIZE, QUEUE_POLL_TIMEOUT};
use crate::pipeline::chunk::{Chunk, CopyRequest, FileData, Part, SpecialKind};
use crate::ui::progress::ProgressReporter;
use crate::warning;

/// Runs on its own thread, consuming `CopyRequest`s and producing `Chunk`s.
/// Per-request errors are logged and swallowed; the thread itself never
/// stops for them.
pub fn run(
    input: Receiver<CopyRequest>,
    output: Sender<Chunk>,
    running: Arc<AtomicBool>,
    progress: Option<Arc<ProgressReporter>>,
) {
    loop {
        let request = match input.recv_timeout(QUEUE_POLL_TIMEOUT) {
            Ok(r) => r,
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some(reporter) = &progress {
            reporter.processing(request.dst_file.clone(), request.diff);
        }

        if let Err(e) = process(&request, &output, progress.as_deref()) {
            if let Some(reporter) = &progress {
                reporter.error();
            }
            warning!(
                "failed to read '{}': {e}",
                request.src_file.display()
            );
        }
    }
}

fn process(
    request: &CopyRequest,
    output: &Sender<Chunk>,
    progress: Option<&ProgressReporter>,
) -> std::io::Result<()> {
    let resolved_src = match &request.src_resolver {
        Some(resolver) => resolver(request).unwrap_or_else(|| request.src_file.clone()),
        None => request.src_file.clone(),
    };

    if request.is_symlink {
        return read_symlink(&resolved_src, request, output);
    }
    if !request.is_file {
        return read_special(&resolved_src, request, output);
    }
    if request.size == 0 {
        let _ = output.send(Chunk::File {
            src_dir: request.src_dir.clone(),
            dst_file: request.dst_file.clone(),
            data: FileData::Empty,
        });
    } else {
        read_regular_file(&resolved_src, request, output, progress)?;
    }

    let _ = output.send(Chunk::Meta {
        dst_file: request.dst_file.clone(),
        src_file: resolved_src,
    });
    Ok(())
}

fn read_symlink(src: &Path, request: &CopyRequest, output: &Sender<Chunk>) -> std::io::Result<()> {
    let target = std::fs::read_link(src)?;
    let _ = output.send(Chunk::Symlink {
        src_dir: request.src_dir.clone(),
        dst_file: request.dst_file.clone(),
        target,
    });
    let _ = output.send(Chunk::Meta {
        dst_file: request.dst_file.clone(),
        src_file: src.to_path_buf(),
    });
    Ok(())
}

fn read_special(src: &Path, request: &CopyRequest, output: &Sender<Chunk>) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(src)?;
    let mode = meta.mode();
    let kind = classify_special(mode);
    let _ = output.send(Chunk::Special {
        src_dir: request.src_dir.clone(),
        dst_file: request.dst_file.clone(),
        kind,
    });
    let _ = output.send(Chunk::Meta {
        dst_file: request.dst_file.clone(),
        src_file: src.to_path_buf(),
    });
    Ok(())
}

fn classify_special(mode: u32) -> SpecialKind {
    let file_type = mode & libc::S_IFMT;
    if file_type == libc::S_IFCHR {
        SpecialKind::Char
    } else if file_type == libc::S_IFBLK {
        SpecialKind::Block
    } else if file_type == libc::S_IFIFO {
        SpecialKind::Fifo
    } else {
        SpecialKind::Socket
    }
}

fn is_sparse_candidate(meta: &std::fs::Metadata, size: u64) -> bool {
    size >= CHUNK_SIZE && meta.blocks() * 512 < size
}

fn read_regular_file(
    src: &Path,
    request: &CopyRequest,
    output: &Sender<Chunk>,
    progress: Option<&ProgressReporter>,
) -> std::io::Result<()> {
    let mut file = File::open(src)?;
    let meta = file.metadata()?;
    let detect_sparse = is_sparse_candidate(&meta, request.size);

    let zero_part = vec![0u8; PART_SIZE as usize];
    let mut parts = Vec::with_capacity(PARTS_PER_CHUNK);
    let mut buf = vec![0u8; PART_SIZE as usize];

    loop {
        let read = read_full(&mut file, &mut buf)?;
        if read == 0 {
            break;
        }

        let part = if detect_sparse && read == buf.len() && buf == zero_part {
            Part::Sparse
        } else {
            Part::Raw(buf[..read].to_vec())
        };
        if let Some(reporter) = progress {
            reporter.processed_bytes(read as u64);
        }
        parts.push(part);

        if parts.len() >= PARTS_PER_CHUNK {
            let _ = output.send(Chunk::File {
                src_dir: request.src_dir.clone(),
                dst_file: request.dst_file.clone(),
                data: FileData::Parts(std::mem::take(&mut parts)),
            });
        }

        if read < buf.len() {
            break;
        }
    }

    if !parts.is_empty() {
        let _ = output.send(Chunk::File {
            src_dir: request.src_dir.clone(),
            dst_file: request.dst_file.clone(),
            data: FileData::Parts(parts),
        });
    }

    Ok(())
}

/// Reads until `buf` is full or EOF, since a single `read` syscall is not
/// guaranteed to fill the buffer even when more data remains.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
