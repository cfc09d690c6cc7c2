#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};

use restore_fs::{LiveRestoreConfig, LiveRestoreFile, LiveRestoreFs, StdFilesystem};
use tempfile::TempDir;

/// Paired source/destination homes inside one temporary directory.
///
/// The source home stands in for the read-only backup being restored; the
/// destination home is the engine's working directory.
pub struct Fixture {
    _root: TempDir,
    pub source_home: PathBuf,
    pub destination_home: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let source_home = root.path().join("source");
        let destination_home = root.path().join("destination");
        fs::create_dir(&source_home).unwrap();
        fs::create_dir(&destination_home).unwrap();
        Self {
            _root: root,
            source_home,
            destination_home,
        }
    }

    /// Place a file in the source home before mounting.
    pub fn seed_source(&self, name: &str, data: &[u8]) {
        fs::write(self.source_home.join(name), data).unwrap();
    }

    pub fn config(&self) -> LiveRestoreConfig {
        LiveRestoreConfig::new(&self.source_home)
    }

    pub fn mount(&self) -> LiveRestoreFs<StdFilesystem> {
        self.mount_with(&self.config())
    }

    pub fn mount_with(&self, config: &LiveRestoreConfig) -> LiveRestoreFs<StdFilesystem> {
        LiveRestoreFs::mount(StdFilesystem::new(), &self.destination_home, config).unwrap()
    }

    /// The logical path for `name`; logical names always begin with the
    /// destination home.
    pub fn logical(&self, name: &str) -> PathBuf {
        self.destination_home.join(name)
    }

    /// The destination-side backing path for `name`.
    pub fn dest_path(&self, name: &str) -> PathBuf {
        self.destination_home.join(name)
    }

    /// The on-disk tombstone path for `name`.
    pub fn tombstone_path(&self, name: &str) -> PathBuf {
        self.destination_home.join(format!("{name}.deleted"))
    }
}

/// Read `len` bytes at `offset` through a handle.
pub fn read_vec(file: &LiveRestoreFile<StdFilesystem>, offset: u64, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    file.read(offset, &mut buf).unwrap();
    buf
}

/// A position-dependent byte pattern, so misplaced ranges are caught.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn assert_file_contents(path: &Path, expect: &[u8]) {
    let got = fs::read(path).unwrap();
    assert_eq!(
        got.len(),
        expect.len(),
        "length mismatch for {}",
        path.display()
    );
    assert_eq!(got, expect, "content mismatch for {}", path.display());
}
