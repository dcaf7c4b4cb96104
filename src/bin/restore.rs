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

use clap::Parser;

use cairn::commands::{cmd_restore, CommonArgs};
use cairn::{error, global};

#[derive(Parser, Debug)]
#[command(name = "restore", about = "Restore a snapshot (or parts of it) onto a target directory")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    args: cmd_restore::CmdArgs,
}

fn main() {
    let cli = Cli::parse();
    global::set_global_opts_with_args(&cli.common);

    if let Err(e) = ctrlc::set_handler(global::request_shutdown) {
        error!("failed to install signal handler: {e}");
    }

    if let Err(e) = cmd_restore::run(&cli.common, &cli.args) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
