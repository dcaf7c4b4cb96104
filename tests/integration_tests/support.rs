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

//! Scaffolding shared by the end-to-end CLI tests: `Config::load_profile`
//! always reads `~/.config/cairn/<profile>.toml` through the `dirs` crate, so
//! the only way to point it at a disposable fixture is to redirect
//! `XDG_CONFIG_HOME` for the duration of a test. `ENV_LOCK` keeps two tests in
//! this binary from reading each other's profile.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use anyhow::Result;
use tempfile::TempDir;

use cairn::commands::{cmd_backup, cmd_restore, CommonArgs};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// A backup root plus its private `XDG_CONFIG_HOME`, torn down together.
/// Holds `ENV_LOCK` for its entire lifetime so no other test's profile lookup
/// can interleave with this one's.
pub struct Fixture {
    _guard: MutexGuard<'static, ()>,
    pub config_home: TempDir,
    pub source: TempDir,
    pub destination: TempDir,
    pub profile: String,
}

impl Fixture {
    pub fn new(profile: &str) -> Self {
        let guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let config_home = TempDir::new().unwrap();
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", config_home.path());
        }
        Self {
            _guard: guard,
            config_home,
            source: TempDir::new().unwrap(),
            destination: TempDir::new().unwrap(),
            profile: profile.to_string(),
        }
    }

    /// Writes the profile file pointing `source.paths`/`destination.path` at
    /// this fixture's own directories, with `excludes` as given.
    pub fn write_profile(&self, excludes: &[&str]) {
        let dir = self.config_home.path().join("cairn");
        std::fs::create_dir_all(&dir).unwrap();
        let excludes_toml = excludes
            .iter()
            .map(|e| format!("\"{e}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let contents = format!(
            "[source]\npaths = [\"{src}\"]\nexcludes = [{excludes}]\n\n[destination]\npath = \"{dst}\"\n",
            src = self.source.path().display(),
            excludes = excludes_toml,
            dst = self.destination.path().display(),
        );
        std::fs::write(dir.join(format!("{}.toml", self.profile)), contents).unwrap();
    }

    pub fn common_args(&self) -> CommonArgs {
        CommonArgs {
            profile: self.profile.clone(),
            verbosity: None,
            quiet: true,
        }
    }

    pub fn backup(&self) -> Result<()> {
        cmd_backup::run(&self.common_args(), &cmd_backup::CmdArgs::default())
    }

    pub fn restore(
        &self,
        timestamp: Option<&str>,
        target: &Path,
        sources: Vec<String>,
        overwrite: bool,
    ) -> Result<()> {
        let args = cmd_restore::CmdArgs {
            timestamp: timestamp.map(str::to_string),
            target: target.to_path_buf(),
            sources,
            overwrite,
        };
        cmd_restore::run(&self.common_args(), &args)
    }

    /// Committed snapshot directories under this fixture's destination,
    /// ascending by name (snapshot timestamps sort lexicographically).
    pub fn committed_snapshots(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(self.destination.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && !p
                        .file_name()
                        .unwrap()
                        .to_string_lossy()
                        .ends_with("-in-progress")
            })
            .collect();
        found.sort();
        found
    }
}
