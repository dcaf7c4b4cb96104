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

pub mod defaults;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use crate::commands::CommonArgs;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Flipped by the `ctrlc::set_handler` callback each binary installs at
/// startup; polled between items by the backup/restore command loops for
/// the "best-effort drain" keyboard-interrupt behaviour (§6/§5).
pub fn request_shutdown() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn shutdown_requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Process-wide options derived from CLI flags, read by code that has no
/// direct line to the parsed arguments (progress reporters, logging macros).
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub verbosity: u32,
    pub quiet: bool,
}

static GLOBAL_OPTS: OnceLock<GlobalOpts> = OnceLock::new();

/// Returns the process-wide options, if they have been set.
pub fn global_opts() -> Option<&'static GlobalOpts> {
    GLOBAL_OPTS.get()
}

/// Sets the process-wide options from parsed CLI arguments. Safe to call once
/// per process; later calls are ignored, which is what every binary entry
/// point needs since they only ever set this once.
pub fn set_global_opts_with_args(args: &CommonArgs) {
    let opts = GlobalOpts {
        verbosity: args.verbosity.unwrap_or(defaults::DEFAULT_VERBOSITY),
        quiet: args.quiet,
    };
    let _ = GLOBAL_OPTS.set(opts);
}
