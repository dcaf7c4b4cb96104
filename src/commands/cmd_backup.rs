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

//! `backup` command: loads a profile's config, scans its source trees into
//! the persistent catalog, and — when anything changed — copies into a new,
//! atomically committed snapshot.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use std::sync::Arc;

use crate::catalog::{Catalog, NodeDiff};
use crate::commands::CommonArgs;
use crate::config::Config;
use crate::external::{LocalVolumeMounter, NoopPowerManagement, SleepInhibitor, VolumeMounter};
use crate::global::defaults::{CATALOG_FILE_NAME, DEFAULT_READ_CONCURRENCY, DEFAULT_WRITE_CONCURRENCY};
use crate::log;
use crate::scanner::{Excludes, Scanner};
use crate::snapshot::{CommitOutcome, SnapshotController};
use crate::ui::progress::ProgressReporter;
use crate::ui::table::{Alignment, Table};
use crate::util::format_size;

#[derive(Args, Debug, Clone, Default)]
pub struct CmdArgs {}

/// Diff counts and byte totals captured right before `commit()` rolls
/// `cur_*` into the baseline — the catalog's differential queries return
/// nothing useful once that has happened.
struct DiffSummary {
    new_files: usize,
    changed_files: usize,
    unchanged_files: usize,
    deleted_files: usize,
    new_dirs: usize,
    changed_dirs: usize,
    deleted_dirs: usize,
    added_or_modified_bytes: u64,
}

pub fn run(common: &CommonArgs, _args: &CmdArgs) -> Result<()> {
    let config = Config::load_profile(&common.profile)
        .with_context(|| format!("failed to load profile '{}'", common.profile))?;

    let mounter = LocalVolumeMounter;
    let mount = mounter
        .mount(&config.destination.path)
        .context("failed to mount backup destination")?;
    let destination = if config.destination.path.starts_with("volume://") {
        mount.mounted_path.clone()
    } else {
        config.destination_path()
    };

    if !destination.is_dir() {
        bail!(
            "backup destination '{}' does not exist; create it before running a backup",
            destination.display()
        );
    }

    let power = NoopPowerManagement;
    let _inhibitor = if config.power_management.disable_sleep_timeouts {
        Some(SleepInhibitor::engage(&power).context("failed to disable sleep timeouts")?)
    } else {
        None
    };

    let sources = config.source_paths();
    if sources.is_empty() {
        bail!("no source paths configured for profile '{}'", common.profile);
    }

    let catalog_path = destination.join(CATALOG_FILE_NAME);
    let mut catalog = Catalog::open(&catalog_path)
        .with_context(|| format!("failed to open catalog at '{}'", catalog_path.display()))?;

    log!("scanning {} source path(s)...", sources.len());
    let mut nodes = Vec::new();
    for root in &sources {
        let excludes = Excludes::compile(&config.source.excludes)?;
        let scanner = Scanner::new(root, excludes)
            .with_context(|| format!("failed to scan '{}'", root.display()))?;
        nodes.extend(scanner);
    }
    catalog
        .ingest(nodes)
        .context("failed to ingest scan results into the catalog")?;

    let num_changed = catalog.num_changed()?;
    if num_changed == 0 {
        log!("nothing changed since the last backup; no new snapshot created.");
        mounter.unmount(mount)?;
        return Ok(());
    }

    let added_files = catalog.added_files()?;
    let modified_files = catalog.modified_files()?;
    let added_or_modified_bytes = catalog.added_or_modified_bytes()?;

    let summary = DiffSummary {
        new_files: added_files.len(),
        changed_files: modified_files.len(),
        unchanged_files: catalog.unmodified_files()?.len(),
        deleted_files: catalog.deleted_files()?.len(),
        new_dirs: catalog.added_dirs()?.len(),
        changed_dirs: catalog.modified_dirs()?.len(),
        deleted_dirs: catalog.deleted_dirs()?.len(),
        added_or_modified_bytes,
    };
    let dirs_to_create = catalog.added_or_modified_dirs()?;

    let progress = Arc::new(ProgressReporter::new(
        (added_files.len() + modified_files.len()) as u64,
        added_or_modified_bytes,
        DEFAULT_READ_CONCURRENCY + DEFAULT_WRITE_CONCURRENCY,
    ));

    let controller = SnapshotController::create_with_progress(&destination, Some(progress.clone()))
        .context("failed to create the in-progress snapshot directory")?;
    controller.create_tree(&dirs_to_create)?;
    controller.copy_files(&added_files, NodeDiff::New);
    controller.copy_files(&modified_files, NodeDiff::Changed);

    let outcome = controller
        .finish(&mut catalog)
        .context("failed to commit the snapshot")?;
    progress.finalize();

    show_final_report(&summary, &outcome);

    mounter
        .unmount(mount)
        .context("failed to unmount backup destination")?;
    Ok(())
}

fn show_final_report(summary: &DiffSummary, outcome: &CommitOutcome) {
    log!("\n{}", "backup complete".green().bold());
    log!("snapshot: {}", outcome.snapshot_dir.display());

    let mut diff = Table::new(
        &["", "new", "changed", "unchanged", "deleted"],
        &[
            Alignment::Left,
            Alignment::Right,
            Alignment::Right,
            Alignment::Right,
            Alignment::Right,
        ],
    );
    diff.add_row(vec![
        "files".to_string(),
        summary.new_files.to_string(),
        summary.changed_files.to_string(),
        summary.unchanged_files.to_string(),
        summary.deleted_files.to_string(),
    ]);
    diff.add_row(vec![
        "dirs".to_string(),
        summary.new_dirs.to_string(),
        summary.changed_dirs.to_string(),
        "-".to_string(),
        summary.deleted_dirs.to_string(),
    ]);
    log!("{}", diff.render());

    log!(
        "copied {} ({} file(s), {} symlink(s), {} special node(s))",
        format_size(summary.added_or_modified_bytes, 2),
        outcome.stats.files_written,
        outcome.stats.symlinks_written,
        outcome.stats.specials_written
    );
}
