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

//! `restore` command: selects a snapshot (or the latest one), resolves the
//! requested source-path prefixes against its catalog, and streams the
//! selection through the copy pipeline onto a target directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use crate::catalog::{DirRecord, FileRecord};
use crate::commands::CommonArgs;
use crate::config::Config;
use crate::error::RestoreError;
use crate::external::{LocalVolumeMounter, VolumeMounter};
use crate::global::defaults::{DEFAULT_READ_CONCURRENCY, DEFAULT_WRITE_CONCURRENCY};
use crate::log;
use crate::pipeline::Pipeline;
use crate::restorer::{build_copy_requests, RestoreResolver};
use crate::ui::progress::ProgressReporter;
use crate::ui::table::{Alignment, Table};
use crate::util::{format_size, strip_root};

#[derive(Args, Debug, Clone)]
pub struct CmdArgs {
    /// Snapshot timestamp to restore from; defaults to the latest committed one.
    #[clap(long)]
    pub timestamp: Option<String>,

    /// Directory to restore into; must already exist.
    #[clap(long)]
    pub target: PathBuf,

    /// One or more absolute source-path prefixes to restore. Defaults to
    /// restoring everything in the snapshot.
    #[clap(long = "source", value_name = "PATH")]
    pub sources: Vec<String>,

    /// Overwrite files already present at the destination.
    #[clap(long, default_value_t = false)]
    pub overwrite: bool,
}

pub fn run(common: &CommonArgs, args: &CmdArgs) -> Result<()> {
    let config = Config::load_profile(&common.profile)
        .with_context(|| format!("failed to load profile '{}'", common.profile))?;

    let mounter = LocalVolumeMounter;
    let mount = mounter
        .mount(&config.destination.path)
        .context("failed to mount backup source")?;
    let root = if config.destination.path.starts_with("volume://") {
        mount.mounted_path.clone()
    } else {
        config.destination_path()
    };

    if !root.is_dir() {
        bail!("backup root '{}' does not exist", root.display());
    }
    if !args.target.is_dir() {
        bail!(
            "restore target '{}' does not exist; create it before restoring",
            args.target.display()
        );
    }

    let resolver = RestoreResolver::discover(&root).context("failed to enumerate snapshots")?;
    let ts = resolver.resolve_timestamp(args.timestamp.as_deref())?;
    let snapshot_dir = resolver.snapshot_dir(&ts);

    let prefixes = if args.sources.is_empty() {
        vec!["/".to_string()]
    } else {
        args.sources.clone()
    };

    let (files, dirs) = resolver.select(&ts, &prefixes)?;
    resolver.verify_all_resolvable(&ts, &files)?;

    if !args.overwrite {
        for file in &files {
            let rel = strip_root(&file.full_path());
            let dest = args.target.join(&rel);
            if dest.symlink_metadata().is_ok() {
                return Err(RestoreError::DestinationExists(dest).into());
            }
        }
    }

    for dir in &dirs {
        let rel = strip_root(Path::new(&dir.path));
        fs::create_dir_all(args.target.join(&rel))?;
    }

    log!("restoring {} file(s) from snapshot {ts}...", files.len());

    let src_resolver = resolver.resolver(&ts);
    let requests = build_copy_requests(&files, &snapshot_dir, &args.target, src_resolver);

    let bytes_to_restore: u64 = files.iter().map(|f| f.size).sum();
    let progress = Arc::new(ProgressReporter::new(
        files.len() as u64,
        bytes_to_restore,
        DEFAULT_READ_CONCURRENCY + DEFAULT_WRITE_CONCURRENCY,
    ));

    let pipeline = Pipeline::start_with_progress(Some(progress.clone()));
    for request in requests {
        if crate::global::shutdown_requested() {
            break;
        }
        pipeline.submit(request);
    }
    let (_dirs_need_stats, stats) = pipeline.drain();
    progress.finalize();

    resolver.copy_dir_stats(&ts, &dirs, &args.target)?;

    show_final_report(&ts, &files, &dirs, stats.files_written, stats.symlinks_written);

    mounter
        .unmount(mount)
        .context("failed to unmount backup source")?;
    Ok(())
}

fn show_final_report(
    ts: &str,
    files: &[FileRecord],
    dirs: &[DirRecord],
    files_written: u64,
    symlinks_written: u64,
) {
    log!("\n{}", "restore complete".green().bold());
    log!("snapshot: {ts}");

    let bytes: u64 = files.iter().map(|f| f.size).sum();

    let mut summary = Table::new(
        &["", "count"],
        &[Alignment::Left, Alignment::Right],
    );
    summary.add_row(vec!["files".to_string(), files.len().to_string()]);
    summary.add_row(vec!["dirs".to_string(), dirs.len().to_string()]);
    log!("{}", summary.render());

    log!(
        "wrote {} ({} file(s), {} symlink(s))",
        format_size(bytes, 2),
        files_written,
        symlinks_written
    );
}
