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

//! Live progress for a backup or restore run: one `indicatif` bar tracking
//! bytes/items against the expected total, plus a handful of file spinners
//! showing what's currently in flight.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressState, ProgressStyle};
use parking_lot::RwLock;

use crate::catalog::NodeDiff;
use crate::global::defaults::{PROGRESS_REFRESH_RATE_HZ, SPINNER_TICK_CHARS};
use crate::global::global_opts;
use crate::ui::default_bar_draw_target;
use crate::util::{format_size, pretty_print_duration};

pub struct ProgressReporter {
    processed_items_count: Arc<AtomicU64>,
    processed_bytes: Arc<AtomicU64>,
    processing_items: Arc<RwLock<VecDeque<PathBuf>>>,
    error_counter: Arc<AtomicU32>,

    #[allow(dead_code)]
    mp: MultiProgress,
    progress_bar: ProgressBar,
    file_spinners: Vec<ProgressBar>,

    verbosity: u32,
}

impl ProgressReporter {
    pub fn new(expected_items: u64, expected_size: u64, num_in_flight_slots: usize) -> Self {
        let mp = MultiProgress::with_draw_target(default_bar_draw_target());
        let progress_bar = mp.add(ProgressBar::new(expected_size));

        let processed_items_count = Arc::new(AtomicU64::new(0));
        let processed_bytes = Arc::new(AtomicU64::new(0));
        let processing_items = Arc::new(RwLock::new(VecDeque::new()));
        let error_counter = Arc::new(AtomicU32::new(0));

        let items_for_key = processed_items_count.clone();
        let bytes_for_key = processed_bytes.clone();
        let errors_for_key = error_counter.clone();
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{bar:20.cyan/white}] [{custom_elapsed}]  {processed_bytes_fmt}  [{processed_items_fmt}]  [ETA: {custom_eta}]  {errors} errors",
                )
                .expect("the progress bar template is a fixed, valid string")
                .progress_chars("=> ")
                .with_key("custom_elapsed", move |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = w.write_str(&pretty_print_duration(state.elapsed()));
                })
                .with_key("processed_bytes_fmt", move |_state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let bytes = bytes_for_key.load(Ordering::SeqCst);
                    let s = format!("{} / {}", format_size(bytes, 2), format_size(expected_size, 2));
                    let _ = w.write_str(&s);
                })
                .with_key("processed_items_fmt", move |_state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let count = items_for_key.load(Ordering::SeqCst);
                    let _ = w.write_str(&format!("{count} / {expected_items} items"));
                })
                .with_key("custom_eta", move |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = w.write_str(&pretty_print_duration(state.eta()));
                })
                .with_key("errors", move |_state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = w.write_str(&errors_for_key.load(Ordering::SeqCst).to_string());
                }),
        );

        let mut file_spinners = Vec::with_capacity(num_in_flight_slots);
        for _ in 0..num_in_flight_slots {
            let spinner = mp.add(ProgressBar::new_spinner());
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap()
                    .tick_chars(SPINNER_TICK_CHARS),
            );
            spinner.enable_steady_tick(Duration::from_millis(
                (1000.0 / PROGRESS_REFRESH_RATE_HZ as f64) as u64,
            ));
            file_spinners.push(spinner);
        }

        Self {
            processed_items_count,
            processed_bytes,
            processing_items,
            error_counter,
            mp,
            progress_bar,
            file_spinners,
            verbosity: global_opts().map(|o| o.verbosity).unwrap_or(1),
        }
    }

    fn update_spinners(&self) {
        for (i, spinner) in self.file_spinners.iter().enumerate() {
            spinner.set_message(
                self.processing_items
                    .read()
                    .get(i)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
        }
    }

    pub fn finalize(&self) {
        let _ = self.mp.clear();
    }

    pub fn processing(&self, path: PathBuf, diff: NodeDiff) {
        if diff != NodeDiff::Deleted {
            self.processing_items.write().push_back(path.clone());
            self.update_spinners();
        }

        if self.verbosity >= 3 {
            let mark = match diff {
                NodeDiff::New => "+".bold().green(),
                NodeDiff::Deleted => "-".bold().red(),
                NodeDiff::Changed => "M".bold().yellow(),
                NodeDiff::Unchanged => "U".bold(),
            };
            self.progress_bar.println(format!("{mark}  {}", path.display()));
        }
    }

    pub fn processed(&self, path: &Path) {
        let idx = self.processing_items.read().iter().position(|p| p == path);
        if let Some(i) = idx {
            self.processing_items.write().remove(i);
            self.update_spinners();
        }
        self.processed_items_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed_bytes(&self, bytes: u64) {
        self.processed_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.progress_bar.inc(bytes);
    }

    pub fn error(&self) {
        self.error_counter.fetch_add(1, Ordering::Relaxed);
    }
}
