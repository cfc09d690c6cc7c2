#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use restore_fs::{FileType, FsError, OpenFlags};

use common::{Fixture, read_vec};

#[test]
fn removing_a_source_only_file_leaves_just_a_tombstone() {
    let fix = Fixture::new();
    fix.seed_source("d.dat", &[0x44; 4096]);
    let fs = fix.mount();

    let logical = fix.logical("d.dat");
    assert!(fs.exist(&logical).unwrap());

    fs.remove(&logical, OpenFlags::empty()).unwrap();

    assert!(!fix.dest_path("d.dat").exists());
    assert!(fix.tombstone_path("d.dat").exists());
    assert!(!fs.exist(&logical).unwrap());
    assert!(
        !fs.directory_list(&fix.destination_home, "")
            .unwrap()
            .contains(&"d.dat".to_string())
    );
}

#[test]
fn removing_a_destination_file_deletes_it_and_tombstones_the_name() {
    let fix = Fixture::new();
    fix.seed_source("e.dat", &[0x45; 4096]);
    let fs = fix.mount();

    let logical = fix.logical("e.dat");
    let file = fs
        .open_file(&logical, FileType::Data, OpenFlags::empty())
        .unwrap();
    let _ = read_vec(&file, 0, 4096);
    file.close().unwrap();
    assert!(fix.dest_path("e.dat").exists());

    fs.remove(&logical, OpenFlags::DURABLE).unwrap();
    assert!(!fix.dest_path("e.dat").exists());
    assert!(fix.tombstone_path("e.dat").exists());
    assert!(!fs.exist(&logical).unwrap());
}

#[test]
fn removing_a_nonexistent_name_is_a_silent_no_op() {
    let fix = Fixture::new();
    let fs = fix.mount();

    fs.remove(&fix.logical("zz.dat"), OpenFlags::empty()).unwrap();
    assert!(!fix.tombstone_path("zz.dat").exists());
}

#[test]
fn renaming_a_destination_file_tombstones_both_names() {
    let fix = Fixture::new();
    let fs = fix.mount();

    let file = fs
        .open_file(&fix.logical("e.dat"), FileType::Data, OpenFlags::CREATE)
        .unwrap();
    file.write(0, &[0x45; 512]).unwrap();
    file.close().unwrap();

    fs.rename(&fix.logical("e.dat"), &fix.logical("f.dat"), OpenFlags::empty())
        .unwrap();

    assert!(!fix.dest_path("e.dat").exists());
    assert!(fix.dest_path("f.dat").exists());
    assert!(fix.tombstone_path("e.dat").exists());
    assert!(fix.tombstone_path("f.dat").exists());

    let listing = fs.directory_list(&fix.destination_home, "").unwrap();
    assert!(listing.contains(&"f.dat".to_string()));
    assert!(!listing.contains(&"e.dat".to_string()));
}

#[test]
fn renaming_a_source_only_file_records_both_tombstones() {
    let fix = Fixture::new();
    fix.seed_source("s.dat", &[0x53; 4096]);
    let fs = fix.mount();

    fs.rename(&fix.logical("s.dat"), &fix.logical("t.dat"), OpenFlags::empty())
        .unwrap();

    assert!(fix.tombstone_path("s.dat").exists());
    assert!(fix.tombstone_path("t.dat").exists());
    assert!(!fs.exist(&fix.logical("s.dat")).unwrap());
}

#[test]
fn renaming_a_missing_name_is_not_found() {
    let fix = Fixture::new();
    let fs = fix.mount();

    let err = fs
        .rename(&fix.logical("no.dat"), &fix.logical("yes.dat"), OpenFlags::empty())
        .unwrap_err();
    assert!(matches!(err, FsError::NotFound { .. }), "got {err:?}");
}

#[test]
fn size_is_answered_by_the_destination_layer() {
    let fix = Fixture::new();
    let fs = fix.mount();

    let file = fs
        .open_file(&fix.logical("z.dat"), FileType::Data, OpenFlags::CREATE)
        .unwrap();
    file.write(0, &[0x5A; 1024]).unwrap();
    file.close().unwrap();

    assert_eq!(fs.size(&fix.logical("z.dat")).unwrap(), 1024);

    let err = fs.size(&fix.logical("missing.dat")).unwrap_err();
    assert!(matches!(err, FsError::NotFound { .. }), "got {err:?}");
}

#[test]
fn exist_prefers_destination_and_respects_tombstones() {
    let fix = Fixture::new();
    fix.seed_source("src.dat", &[0x01; 64]);
    let fs = fix.mount();

    // Source-only names exist until tombstoned.
    assert!(fs.exist(&fix.logical("src.dat")).unwrap());
    fs.remove(&fix.logical("src.dat"), OpenFlags::empty()).unwrap();
    assert!(!fs.exist(&fix.logical("src.dat")).unwrap());

    // Destination files exist regardless of any marker.
    let file = fs
        .open_file(&fix.logical("dst.dat"), FileType::Data, OpenFlags::CREATE)
        .unwrap();
    file.close().unwrap();
    assert!(fs.exist(&fix.logical("dst.dat")).unwrap());

    assert!(!fs.exist(&fix.logical("never.dat")).unwrap());
}

#[test]
fn directory_listing_merges_layers_and_hides_markers() {
    let fix = Fixture::new();
    fix.seed_source("a.dat", &[1; 16]);
    fix.seed_source("b.dat", &[2; 16]);
    fix.seed_source("c.dat", &[3; 16]);
    let fs = fix.mount();

    // a.dat gains a destination copy; b.dat is deleted.
    let file = fs
        .open_file(&fix.logical("a.dat"), FileType::Data, OpenFlags::empty())
        .unwrap();
    file.close().unwrap();
    fs.remove(&fix.logical("b.dat"), OpenFlags::empty()).unwrap();

    let mut listing = fs.directory_list(&fix.destination_home, "").unwrap();
    listing.sort();
    assert_eq!(listing, vec!["a.dat", "c.dat"]);
}

#[test]
fn directory_listing_honors_the_prefix() {
    let fix = Fixture::new();
    fix.seed_source("wal.000001", &[0; 16]);
    fix.seed_source("wal.000002", &[0; 16]);
    fix.seed_source("data.db", &[0; 16]);
    let fs = fix.mount();

    let mut listing = fs.directory_list(&fix.destination_home, "wal.").unwrap();
    listing.sort();
    assert_eq!(listing, vec!["wal.000001", "wal.000002"]);

    let single = fs
        .directory_list_single(&fix.destination_home, "data")
        .unwrap();
    assert_eq!(single.as_deref(), Some("data.db"));

    let none = fs
        .directory_list_single(&fix.destination_home, "nope")
        .unwrap();
    assert_eq!(none, None);
}

#[test]
fn listing_a_directory_missing_on_both_sides_is_empty() {
    let fix = Fixture::new();
    let fs = fix.mount();

    let listing = fs
        .directory_list(&fix.logical("nonexistent"), "")
        .unwrap();
    assert!(listing.is_empty());
}

#[test]
fn a_recreated_name_stays_divorced_from_its_source_copy() {
    let fix = Fixture::new();
    fix.seed_source("d2.dat", &[0x41; 4096]);
    let fs = fix.mount();

    let logical = fix.logical("d2.dat");
    fs.remove(&logical, OpenFlags::empty()).unwrap();

    let file = fs
        .open_file(&logical, FileType::Data, OpenFlags::CREATE)
        .unwrap();
    assert!(file.complete());
    file.write(0, &[0x77; 128]).unwrap();
    assert_eq!(read_vec(&file, 0, 128), vec![0x77; 128]);
    file.close().unwrap();

    // The tombstone persists, so a reopen still ignores the source copy.
    let reopened = fs
        .open_file(&logical, FileType::Data, OpenFlags::empty())
        .unwrap();
    assert!(reopened.complete());
    assert!(reopened.remaining_holes().is_empty());
    assert_eq!(reopened.size().unwrap(), 128);
    reopened.close().unwrap();
}
