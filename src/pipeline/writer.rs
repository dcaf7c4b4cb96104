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

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use filetime::{set_symlink_file_times, FileTime};
use parking_lot::Mutex;

use crate::global::defaults::{PART_SIZE, QUEUE_POLL_TIMEOUT};
use crate::pipeline::chunk::{Chunk, FileData, Part, SpecialKind};
use crate::ui::progress::ProgressReporter;
use crate::warning;

/// Directories the writer had to create on demand (implicit `makedirs`),
/// plus the source directory whose metadata should later be replayed onto
/// them. Read only after both pipeline threads have joined.
pub type DirsNeedStats = Arc<Mutex<Vec<(PathBuf, PathBuf)>>>;

struct OpenOutput {
    path: PathBuf,
    handle: File,
}

pub struct WriterStats {
    pub files_written: u64,
    pub symlinks_written: u64,
    pub specials_written: u64,
}

/// Runs on its own thread, consuming `Chunk`s and materialising them under
/// the destination tree.
pub fn run(
    input: Receiver<Chunk>,
    running: Arc<AtomicBool>,
    dirs_need_stats: DirsNeedStats,
    progress: Option<Arc<ProgressReporter>>,
) -> WriterStats {
    let mut open: Option<OpenOutput> = None;
    let mut stats = WriterStats {
        files_written: 0,
        symlinks_written: 0,
        specials_written: 0,
    };

    loop {
        let chunk = match input.recv_timeout(QUEUE_POLL_TIMEOUT) {
            Ok(c) => c,
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let meta_dst = match &chunk {
            Chunk::Meta { dst_file, .. } => Some(dst_file.clone()),
            _ => None,
        };

        if let Err(e) = handle_chunk(chunk, &mut open, &dirs_need_stats, &mut stats) {
            if let Some(reporter) = &progress {
                reporter.error();
            }
            warning!("write failed: {e}");
        } else if let (Some(reporter), Some(dst)) = (&progress, meta_dst) {
            reporter.processed(&dst);
        }
    }

    if let Some(mut out) = open.take() {
        let _ = out.handle.set_len(out.handle.stream_position().unwrap_or(0));
    }

    stats
}

fn ensure_parent_dir(
    dst_file: &Path,
    src_dir: &Path,
    dirs_need_stats: &DirsNeedStats,
) -> std::io::Result<()> {
    let Some(parent) = dst_file.parent() else {
        return Ok(());
    };
    if !parent.exists() {
        std::fs::create_dir_all(parent)?;
        dirs_need_stats
            .lock()
            .push((parent.to_path_buf(), src_dir.to_path_buf()));
    }
    Ok(())
}

fn handle_chunk(
    chunk: Chunk,
    open: &mut Option<OpenOutput>,
    dirs_need_stats: &DirsNeedStats,
    stats: &mut WriterStats,
) -> std::io::Result<()> {
    match chunk {
        Chunk::Symlink {
            src_dir,
            dst_file,
            target,
        } => {
            ensure_parent_dir(&dst_file, &src_dir, dirs_need_stats)?;
            if dst_file.symlink_metadata().is_ok() {
                std::fs::remove_file(&dst_file)?;
            }
            std::os::unix::fs::symlink(&target, &dst_file)?;
            stats.symlinks_written += 1;
        }
        Chunk::Special {
            src_dir,
            dst_file,
            kind,
        } => {
            ensure_parent_dir(&dst_file, &src_dir, dirs_need_stats)?;
            match kind {
                SpecialKind::Char | SpecialKind::Block => {
                    warning!(
                        "not re-creating unsupported device node '{}'",
                        dst_file.display()
                    );
                }
                SpecialKind::Fifo => mknod(&dst_file, libc::S_IFIFO | 0o600)?,
                SpecialKind::Socket => mknod(&dst_file, libc::S_IFSOCK | 0o600)?,
            }
            stats.specials_written += 1;
        }
        Chunk::File {
            src_dir,
            dst_file,
            data,
        } => {
            ensure_parent_dir(&dst_file, &src_dir, dirs_need_stats)?;
            let needs_new_handle = match open {
                Some(out) => out.path != dst_file,
                None => true,
            };
            if needs_new_handle {
                if let Some(mut prev) = open.take() {
                    let len = prev.handle.stream_position().unwrap_or(0);
                    prev.handle.set_len(len)?;
                }
                let handle = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&dst_file)?;
                stats.files_written += 1;
                *open = Some(OpenOutput {
                    path: dst_file.clone(),
                    handle,
                });
            }

            match data {
                FileData::Empty => {}
                FileData::Parts(parts) => {
                    let out = open.as_mut().expect("handle just opened");
                    for part in parts {
                        match part {
                            Part::Sparse => {
                                out.handle.seek(SeekFrom::Current(PART_SIZE as i64))?;
                            }
                            Part::Raw(bytes) => {
                                out.handle.write_all(&bytes)?;
                            }
                        }
                    }
                }
            }
        }
        Chunk::Meta { dst_file, src_file } => {
            if let Some(out) = open.as_mut() {
                if out.path == dst_file {
                    let len = out.handle.stream_position().unwrap_or(0);
                    out.handle.set_len(len)?;
                    *open = None;
                }
            }
            copy_metadata(&src_file, &dst_file)?;
        }
    }
    Ok(())
}

fn mknod(path: &Path, mode: u32) -> std::io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let rc = unsafe { libc::mknod(c_path.as_ptr(), mode, 0) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Copies mode, ownership, atime and mtime from `src` to `dst` without
/// dereferencing symlinks.
pub fn copy_metadata(src: &Path, dst: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(src)?;

    let mtime = FileTime::from_last_modification_time(&meta);
    let atime = FileTime::from_last_access_time(&meta);
    set_symlink_file_times(dst, atime, mtime)?;

    if !meta.file_type().is_symlink() {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dst, std::fs::Permissions::from_mode(meta.permissions().mode()))?;
    }

    chown_no_follow(dst, meta_uid(&meta), meta_gid(&meta))?;

    Ok(())
}

#[cfg(unix)]
fn meta_uid(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.uid()
}

#[cfg(unix)]
fn meta_gid(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.gid()
}

fn chown_no_follow(path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let rc = unsafe { libc::lchown(c_path.as_ptr(), uid, gid) };
    if rc != 0 {
        // Changing ownership commonly fails for an unprivileged process;
        // this is not fatal to the copy, only to faithfully matching owner.
        return Ok(());
    }
    Ok(())
}
