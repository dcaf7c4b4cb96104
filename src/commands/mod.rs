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

//! Shared CLI plumbing for the `backup` and `restore` binaries: the common
//! profile/verbosity flags each one flattens into its own top-level `clap`
//! struct, and the `run()` entry points themselves.

pub mod cmd_backup;
pub mod cmd_restore;

use clap::Args;

pub const DEFAULT_PROFILE: &str = "default";

/// Flags every binary accepts, mirroring the corpus's own `GlobalArgs`.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Configuration profile to use.
    #[clap(long, default_value = DEFAULT_PROFILE)]
    pub profile: String,

    /// Logging verbosity level (0 = quiet-ish, 3 = per-file trace).
    #[clap(short = 'v', long)]
    pub verbosity: Option<u32>,

    /// Suppress non-error output.
    #[clap(short, long, default_value_t = false)]
    pub quiet: bool,
}
