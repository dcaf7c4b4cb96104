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

//! cairn is an incremental, timestamped filesystem backup tool. The crate is
//! split into the change-detection/copy engine (`catalog`, `scanner`,
//! `pipeline`, `snapshot`, `restorer`) consumed by the two binaries in
//! `src/bin/` through the `commands` module.

#[macro_use]
pub mod ui;

pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod external;
pub mod global;
pub mod pipeline;
pub mod restorer;
pub mod scanner;
pub mod snapshot;
pub mod util;
