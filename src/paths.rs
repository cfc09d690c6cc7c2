//! Layer path resolution and tombstone path construction.
//!
//! Logical names handed to the file system always begin with the destination
//! home; resolution either keeps the name (destination layer) or re-roots the
//! suffix under the source home (source layer). A name outside the
//! destination home is a programmer error and panics.

use std::path::{Path, PathBuf};

use crate::types::LayerKind;

/// Suffix appended to a destination-side path to mark the name as deleted.
/// A tombstone is a zero-byte sibling file; its existence alone carries the
/// meaning, so recovery after a crash is implicit.
pub(crate) const TOMBSTONE_SUFFIX: &str = ".deleted";

/// One layer of the file system: a home directory plus its role.
#[derive(Debug, Clone)]
pub(crate) struct Layer {
    pub home: PathBuf,
    pub kind: LayerKind,
}

impl Layer {
    /// Resolve a logical `name` to the backing path inside this layer.
    ///
    /// # Panics
    ///
    /// Panics if `name` does not begin with `dest_home`.
    pub(crate) fn resolve(&self, dest_home: &Path, name: &Path) -> PathBuf {
        let suffix = match name.strip_prefix(dest_home) {
            Ok(suffix) => suffix,
            Err(_) => panic!(
                "logical name {} does not start with the destination home {}",
                name.display(),
                dest_home.display()
            ),
        };
        match self.kind {
            LayerKind::Destination => name.to_path_buf(),
            LayerKind::Source => self.home.join(suffix),
        }
    }
}

/// The tombstone path for a destination-side path.
pub(crate) fn tombstone_path(dest_path: &Path) -> PathBuf {
    let mut raw = dest_path.as_os_str().to_os_string();
    raw.push(TOMBSTONE_SUFFIX);
    PathBuf::from(raw)
}

/// Whether a directory entry name is itself a tombstone marker.
pub(crate) fn is_tombstone_name(name: &str) -> bool {
    name.ends_with(TOMBSTONE_SUFFIX)
}
