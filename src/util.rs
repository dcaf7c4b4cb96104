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

use std::path::{Path, PathBuf};
use std::time::Duration;

#[allow(non_upper_case_globals)]
pub mod size {
    pub const KiB: u64 = 1024;
    pub const MiB: u64 = 1024 * KiB;
    pub const GiB: u64 = 1024 * MiB;
}

/// Renders the current time as a fixed-width `seconds.fractional` snapshot id.
///
/// A floating-point id risks lexical and numeric ordering disagreeing once
/// the fractional part has a different number of digits; padding it to a
/// fixed width keeps both orderings in sync.
pub fn snapshot_timestamp_now() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:07}", now.as_secs(), now.subsec_nanos() / 100)
}

/// Parses a snapshot directory name (`<seconds>.<fraction>`) into its
/// sortable numeric value.
pub fn parse_snapshot_timestamp(name: &str) -> Option<f64> {
    name.parse::<f64>().ok()
}

/// Renders a byte count with a fixed number of significant digits, e.g.
/// `format_size(1536, 2) == "1.50 KiB"`.
pub fn format_size(bytes: u64, decimals: usize) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit_idx = 0;
    while value >= 1024.0 && unit_idx < UNITS.len() - 1 {
        value /= 1024.0;
        unit_idx += 1;
    }
    if unit_idx == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.decimals$} {}", UNITS[unit_idx])
    }
}

/// Renders a duration as `HH:MM:SS`, matching the progress bar's custom ETA
/// and elapsed-time fields.
pub fn pretty_print_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Expands a leading `~` or `~user` and a `$hostname` token in a path string,
/// matching the templating the original shell-driven profile config allowed
/// in destination paths.
pub fn expand_path_template(raw: &str) -> PathBuf {
    let hostname = hostname_string();
    let substituted = raw.replace("$hostname", &hostname);
    expand_tilde(&substituted)
}

fn hostname_string() -> String {
    #[cfg(unix)]
    {
        if let Ok(out) = std::process::Command::new("hostname").output() {
            if out.status.success() {
                return String::from_utf8_lossy(&out.stdout).trim().to_string();
            }
        }
    }
    String::from("localhost")
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix('~') {
        // `~user/...` — best-effort: only the current user's home directory
        // is resolvable without an `/etc/passwd` lookup, so fall back to the
        // literal string when a different user is named.
        if let Some((user, tail)) = rest.split_once('/') {
            if let Some(home) = dirs::home_dir() {
                if home
                    .file_name()
                    .map(|n| n == user)
                    .unwrap_or(false)
                {
                    return home.join(tail);
                }
            }
        }
    }
    PathBuf::from(raw)
}

/// Longest common ancestor directory shared by every path in `paths`.
pub fn longest_common_prefix_dir(paths: &[PathBuf]) -> PathBuf {
    let mut iter = paths.iter();
    let first = match iter.next() {
        Some(p) => p.clone(),
        None => return PathBuf::new(),
    };
    let mut common: Vec<_> = first.components().collect();
    for path in iter {
        let components: Vec<_> = path.components().collect();
        let shared = common
            .iter()
            .zip(components.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }
    common.iter().collect()
}

/// Strips a leading path separator so an absolute source path can be joined
/// under a snapshot root as a relative path.
pub fn strip_root(path: &Path) -> PathBuf {
    path.strip_prefix("/").unwrap_or(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0, 2), "0 B");
        assert_eq!(format_size(1536, 2), "1.50 KiB");
        assert_eq!(format_size(size::MiB, 1), "1.0 MiB");
    }

    #[test]
    fn test_pretty_print_duration() {
        assert_eq!(pretty_print_duration(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn test_snapshot_timestamp_is_sortable_lexically_and_numerically() {
        let a = "1700000000.0000001";
        let b = "1700000001.0000000";
        assert!(a < b);
        assert!(parse_snapshot_timestamp(a).unwrap() < parse_snapshot_timestamp(b).unwrap());
    }

    #[test]
    fn test_strip_root() {
        assert_eq!(strip_root(Path::new("/a/b")), PathBuf::from("a/b"));
        assert_eq!(strip_root(Path::new("a/b")), PathBuf::from("a/b"));
    }

    #[test]
    fn test_longest_common_prefix_dir() {
        let paths = vec![
            PathBuf::from("/home/user/docs/a.txt"),
            PathBuf::from("/home/user/docs/sub/b.txt"),
            PathBuf::from("/home/user/pics/c.jpg"),
        ];
        assert_eq!(
            longest_common_prefix_dir(&paths),
            PathBuf::from("/home/user")
        );
    }
}
