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
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{symlink, MetadataExt};
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};

use cairn::util::strip_root;

use super::support::Fixture;

/// Walks scenarios 1, 2, 3, 4 and 6 end to end against one source tree,
/// driven entirely through `cmd_backup::run` the way the `backup` binary
/// would call it. Each snapshot directory mirrors the source tree's absolute
/// path underneath it, so every expected location is computed the same way
/// the controller itself does: `snapshot_dir.join(strip_root(source_path))`.
#[test]
fn test_backup_lifecycle_across_several_runs() {
    let fx = Fixture::new("backup_lifecycle");
    fx.write_profile(&[]);

    let a_rel = strip_root(&fx.source.path().join("a"));
    let b_rel = strip_root(&fx.source.path().join("b"));
    let big_rel = strip_root(&fx.source.path().join("big"));
    let cache_rel = strip_root(&fx.source.path().join(".cache"));

    // Scenario 1: a plain file plus a symlink to it.
    fs::write(fx.source.path().join("a"), b"hello").unwrap();
    symlink(fx.source.path().join("a"), fx.source.path().join("b")).unwrap();

    fx.backup().expect("first backup should succeed");
    let snapshots = fx.committed_snapshots();
    assert_eq!(snapshots.len(), 1, "first run must create exactly one snapshot");

    let first_snapshot = &snapshots[0];
    assert_eq!(
        fs::read(first_snapshot.join(&a_rel)).unwrap(),
        b"hello",
        "snapshot must contain a's contents"
    );
    assert!(
        fs::symlink_metadata(first_snapshot.join(&b_rel))
            .unwrap()
            .file_type()
            .is_symlink(),
        "snapshot must preserve b as a symlink"
    );

    // Scenario 2: nothing changed, so no new snapshot directory appears.
    fx.backup().expect("no-op backup should still succeed");
    assert_eq!(
        fx.committed_snapshots().len(),
        1,
        "a second run with no changes must not create a new snapshot"
    );

    // Scenario 3: mutate `a`; its mtime must advance past the first run's.
    std::thread::sleep(Duration::from_millis(10));
    fs::write(fx.source.path().join("a"), b"hi").unwrap();
    let bumped = FileTime::from_unix_time(FileTime::now().unix_seconds() + 5, 0);
    set_file_mtime(fx.source.path().join("a"), bumped).unwrap();

    fx.backup().expect("third backup should succeed");
    let snapshots = fx.committed_snapshots();
    assert_eq!(snapshots.len(), 2, "a changed file must produce a new snapshot");

    let second_snapshot = &snapshots[1];
    assert_eq!(fs::read(second_snapshot.join(&a_rel)).unwrap(), b"hi");
    assert!(
        fs::symlink_metadata(second_snapshot.join(&b_rel)).is_err(),
        "b was not re-copied into the new snapshot since it did not change"
    );

    // Scenario 4: a large sparse file with only its first part written.
    let big_path = fx.source.path().join("big");
    {
        let mut f = fs::File::create(&big_path).unwrap();
        f.set_len(20 * 1024 * 1024).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(&[0xAB; 4096]).unwrap();
    }
    std::thread::sleep(Duration::from_millis(10));

    fx.backup().expect("fourth backup should succeed");
    let snapshots = fx.committed_snapshots();
    assert_eq!(snapshots.len(), 3);
    let third_snapshot = &snapshots[2];

    let restored_big = third_snapshot.join(&big_rel);
    assert_eq!(fs::metadata(&restored_big).unwrap().len(), 20 * 1024 * 1024);
    let blocks = fs::metadata(&restored_big).unwrap().blocks();
    assert!(
        blocks * 512 < 20 * 1024 * 1024,
        "sparse file's on-disk size must stay far below its logical size"
    );
    let mut first_bytes = vec![0u8; 4096];
    {
        let mut f = fs::File::open(&restored_big).unwrap();
        f.read_exact(&mut first_bytes).unwrap();
    }
    assert_eq!(first_bytes, vec![0xAB; 4096]);

    // Scenario 6: delete `b`, add an excluded path, and re-run with the
    // exclude pattern configured.
    fs::remove_file(fx.source.path().join("b")).unwrap();
    fs::create_dir(fx.source.path().join(".cache")).unwrap();
    fs::write(fx.source.path().join(".cache/x"), b"junk").unwrap();

    std::thread::sleep(Duration::from_millis(10));
    let big_mtime = FileTime::from_unix_time(FileTime::now().unix_seconds() + 10, 0);
    set_file_mtime(&big_path, big_mtime).unwrap();

    fx.write_profile(&[r"\.cache"]);
    fx.backup().expect("fifth backup with excludes should succeed");

    let snapshots = fx.committed_snapshots();
    assert_eq!(snapshots.len(), 4);
    let fourth_snapshot = &snapshots[3];
    assert!(
        fs::symlink_metadata(fourth_snapshot.join(&b_rel)).is_err(),
        "deleted symlink must not reappear in the new snapshot"
    );
    assert!(
        !fourth_snapshot.join(&cache_rel).exists(),
        "excluded directory must never reach a snapshot"
    );
}
