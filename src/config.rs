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

//! Layered profile configuration: a built-in default merged with an optional
//! user file, the way a `default` + `~/.config/cairn/<profile>.toml` pair
//! would be laid out on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toml::Value;

use crate::util::expand_path_template;

/// The built-in default profile, embedded at compile time so the binary
/// runs with sane settings even when no user config file exists yet.
const DEFAULT_CONFIG_TOML: &str = include_str!("default_config.toml");

/// Recursively merges `overlay` onto `base`: a table key present in both
/// merges child-by-child, any other overlay value replaces the base one
/// outright (this is how a user profile overrides one field of a table
/// without having to repeat its siblings).
fn merge_toml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub path: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            path: String::from("~/backups/$hostname"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    String::from("info")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PowerManagementConfig {
    #[serde(default)]
    pub disable_sleep_timeouts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub power_management: PowerManagementConfig,
}

impl Config {
    /// Loads a named profile: the embedded default merged with a user file
    /// at `~/.config/cairn/<profile>.toml` if one is present. A missing user
    /// file is not an error — the default config stands on its own. A key a
    /// user file doesn't mention falls through from the default, so a user
    /// profile that only sets `[destination] path` doesn't have to repeat
    /// `[source]` or `[logging]`.
    pub fn load_profile(profile: &str) -> Result<Self> {
        let mut merged: Value = toml::from_str(DEFAULT_CONFIG_TOML)
            .context("failed to parse the built-in default config")?;

        if let Some(user_path) = Self::user_config_path(profile) {
            if user_path.exists() {
                let contents = std::fs::read_to_string(&user_path)
                    .with_context(|| format!("failed to read '{}'", user_path.display()))?;
                let overlay: Value = toml::from_str(&contents)
                    .with_context(|| format!("failed to parse '{}'", user_path.display()))?;
                merge_toml(&mut merged, overlay);
            }
        }

        merged
            .try_into()
            .with_context(|| format!("invalid configuration for profile '{profile}'"))
    }

    fn user_config_path(profile: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cairn").join(format!("{profile}.toml")))
    }

    /// The destination path with `~` and `$hostname` templating resolved.
    pub fn destination_path(&self) -> PathBuf {
        expand_path_template(&self.destination.path)
    }

    /// Compiles the configured source paths, expanding templates.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.source
            .paths
            .iter()
            .map(|p| expand_path_template(p))
            .collect()
    }
}

/// Loads a config from an explicit file path, bypassing profile resolution.
/// Used by tests and by callers that already know exactly which file to use.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_has_sane_defaults() {
        let config = Config::default();
        assert!(config.source.paths.is_empty());
        assert_eq!(config.logging.level, "info");
        assert!(!config.power_management.disable_sleep_timeouts);
    }

    #[test]
    fn test_load_from_path_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("profile.toml");
        std::fs::write(
            &path,
            r#"
            [source]
            paths = ["/home/user/docs"]
            excludes = ["\\.cache"]

            [destination]
            path = "/mnt/backup"

            [logging]
            level = "debug"

            [power_management]
            disable_sleep_timeouts = true
            "#,
        )?;

        let config = load_from_path(&path)?;
        assert_eq!(config.source.paths, vec!["/home/user/docs"]);
        assert_eq!(config.destination.path, "/mnt/backup");
        assert_eq!(config.logging.level, "debug");
        assert!(config.power_management.disable_sleep_timeouts);

        Ok(())
    }

    #[test]
    fn test_destination_path_expands_hostname_and_tilde() {
        let mut config = Config::default();
        config.destination.path = "~/backups".to_string();
        let expanded = config.destination_path();
        assert!(expanded.is_absolute() || expanded.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_embedded_default_parses_and_matches_struct_default() {
        let default: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert!(default.source.paths.is_empty());
        assert_eq!(default.destination.path, "~/backups/$hostname");
        assert_eq!(default.logging.level, "info");
    }

    #[test]
    fn test_merge_toml_overrides_only_named_keys() {
        let mut base: Value = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        let overlay: Value = toml::from_str(
            r#"
            [destination]
            path = "/mnt/backup"
            "#,
        )
        .unwrap();
        merge_toml(&mut base, overlay);

        let config: Config = base.try_into().unwrap();
        assert_eq!(config.destination.path, "/mnt/backup");
        // untouched sibling tables fall through from the default
        assert_eq!(config.logging.level, "info");
        assert!(config.source.paths.is_empty());
    }
}
