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

use std::fs;
use std::os::unix::fs::symlink;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use tempfile::tempdir;

use cairn::error::RestoreError;

use super::support::Fixture;

/// Scenario 5: restoring an older snapshot must reproduce exactly what was
/// physically present in that snapshot, falling back through the catalog for
/// anything it borrowed from an even earlier one.
#[test]
fn test_restore_earlier_snapshot_after_a_later_change() {
    let fx = Fixture::new("restore_earlier_snapshot");
    fx.write_profile(&[]);

    fs::write(fx.source.path().join("a"), b"hello").unwrap();
    symlink(fx.source.path().join("a"), fx.source.path().join("b")).unwrap();
    fx.backup().expect("first backup should succeed");

    let snapshots = fx.committed_snapshots();
    assert_eq!(snapshots.len(), 1);
    let first_ts = snapshots[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();

    std::thread::sleep(Duration::from_millis(10));
    fs::write(fx.source.path().join("a"), b"hi").unwrap();
    let bumped = FileTime::from_unix_time(FileTime::now().unix_seconds() + 5, 0);
    set_file_mtime(fx.source.path().join("a"), bumped).unwrap();
    fx.backup().expect("second backup should succeed");
    assert_eq!(fx.committed_snapshots().len(), 2);

    let restore_target = tempdir().unwrap();
    fx.restore(Some(&first_ts), restore_target.path(), vec![], false)
        .expect("restoring the first snapshot should succeed");

    let restored_a = restore_target.path().join(
        cairn::util::strip_root(&fx.source.path().join("a")),
    );
    let restored_b = restore_target.path().join(
        cairn::util::strip_root(&fx.source.path().join("b")),
    );

    assert_eq!(
        fs::read(&restored_a).unwrap(),
        b"hello",
        "restoring the first snapshot must yield a's original contents"
    );
    assert!(
        fs::symlink_metadata(&restored_b)
            .unwrap()
            .file_type()
            .is_symlink(),
        "b must still come back as a symlink"
    );
    assert_eq!(fs::read_link(&restored_b).unwrap(), fx.source.path().join("a"));
}

/// Restoring the latest snapshot twice into the same target without
/// `--overwrite` must refuse on the second pass rather than clobber files.
#[test]
fn test_restore_refuses_to_overwrite_without_flag() {
    let fx = Fixture::new("restore_overwrite_refusal");
    fx.write_profile(&[]);

    fs::write(fx.source.path().join("a"), b"hello").unwrap();
    fx.backup().expect("backup should succeed");

    let restore_target = tempdir().unwrap();
    fx.restore(None, restore_target.path(), vec![], false)
        .expect("first restore into an empty target should succeed");

    let err = fx
        .restore(None, restore_target.path(), vec![], false)
        .expect_err("restoring into the same target again must be refused");
    let restore_err = err
        .downcast_ref::<RestoreError>()
        .expect("error must be a RestoreError");
    assert!(matches!(restore_err, RestoreError::DestinationExists(_)));

    fx.restore(None, restore_target.path(), vec![], true)
        .expect("restoring with --overwrite must succeed");
}
