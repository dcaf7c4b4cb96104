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

//! Trait boundaries for the collaborators the core engine treats as external
//! to its own scope (§6): removable-volume mounting and desktop
//! power-management. Real GNOME/GIO/D-Bus integration is out of scope, but
//! the core's call sites — mount-before/unmount-after around a `volume://`
//! destination, disable-sleep-timeouts around a run — still need a concrete
//! trait to call through, so a backup run is a complete, runnable program
//! even though only a no-op implementation ships here.

use std::path::PathBuf;

use anyhow::Result;

/// A mounted removable volume, released by `VolumeMounter::unmount`.
pub struct MountHandle {
    pub mounted_path: PathBuf,
}

/// Resolves a `volume://<name>/<path>` destination URI to a mounted,
/// absolute path, and releases it once the run is done.
pub trait VolumeMounter: Send + Sync {
    fn mount(&self, uri: &str) -> Result<MountHandle>;
    fn unmount(&self, handle: MountHandle) -> Result<()>;
}

/// A mounter that only understands plain local paths: any URI without a
/// `volume://` scheme is returned unchanged, and the scheme itself is
/// rejected as unsupported — there being no removable-volume backend wired
/// up in this core.
pub struct LocalVolumeMounter;

impl VolumeMounter for LocalVolumeMounter {
    fn mount(&self, uri: &str) -> Result<MountHandle> {
        if let Some(rest) = uri.strip_prefix("volume://") {
            anyhow::bail!(
                "no removable-volume backend is configured; cannot mount '{rest}' from '{uri}'"
            );
        }
        Ok(MountHandle {
            mounted_path: PathBuf::from(uri),
        })
    }

    fn unmount(&self, _handle: MountHandle) -> Result<()> {
        Ok(())
    }
}

/// Read/write access to the two sleep-timeout settings (AC, battery) a
/// backup run wants disabled while it's copying.
pub trait PowerManagement: Send + Sync {
    fn sleep_timeouts(&self) -> Result<(i64, i64)>;
    fn set_sleep_timeouts(&self, ac: i64, battery: i64) -> Result<()>;
}

/// A no-op implementation: reads back whatever was last "set" in-process,
/// defaulting to "never" (0), and otherwise does nothing. There is no
/// desktop session to talk to from this core.
pub struct NoopPowerManagement;

impl PowerManagement for NoopPowerManagement {
    fn sleep_timeouts(&self) -> Result<(i64, i64)> {
        Ok((0, 0))
    }

    fn set_sleep_timeouts(&self, _ac: i64, _battery: i64) -> Result<()> {
        Ok(())
    }
}

/// Disables sleep timeouts for the lifetime of the guard, restoring the
/// previous values on drop — the "set to 0 around a run and restore
/// afterwards" policy from §6, expressed as an RAII guard so a run that
/// exits early (error, `?`, panic unwind) still restores them.
pub struct SleepInhibitor<'a> {
    power: &'a dyn PowerManagement,
    previous: (i64, i64),
}

impl<'a> SleepInhibitor<'a> {
    pub fn engage(power: &'a dyn PowerManagement) -> Result<Self> {
        let previous = power.sleep_timeouts()?;
        power.set_sleep_timeouts(0, 0)?;
        Ok(Self { power, previous })
    }
}

impl Drop for SleepInhibitor<'_> {
    fn drop(&mut self) {
        let (ac, battery) = self.previous;
        let _ = self.power.set_sleep_timeouts(ac, battery);
    }
}
