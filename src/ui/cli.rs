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

//! Leveled, colored CLI output. The verbosity gate reads the process-wide
//! `GlobalOpts` set once at startup; until they're set everything prints at
//! the default level.

pub fn current_verbosity() -> u32 {
    crate::global::global_opts()
        .map(|o| o.verbosity)
        .unwrap_or(crate::global::defaults::DEFAULT_VERBOSITY)
}

pub fn is_quiet() -> bool {
    crate::global::global_opts().map(|o| o.quiet).unwrap_or(false)
}

#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {{
        if !$crate::ui::cli::is_quiet() {
            println!($($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! verbose_1 {
    ($($arg:tt)*) => {{
        if !$crate::ui::cli::is_quiet() && $crate::ui::cli::current_verbosity() >= 1 {
            println!($($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "warning:".yellow().bold(), format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "error:".red().bold(), format!($($arg)*));
    }};
}

pub use crate::{error, log, verbose_1, warning};
