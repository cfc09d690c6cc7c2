//! The layered live-restore file system.
//!
//! [`LiveRestoreFs`] owns the mount state shared by every handle: the two
//! layers, the OS backend, the worker cap, and the mount-wide panic flag.
//! Namespace operations (exist, listing, remove, rename, size) resolve names
//! against the destination layer first and fall back to the source, with
//! tombstone markers keeping deleted source names invisible.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument};

use crate::config::LiveRestoreConfig;
use crate::error::{FsError, Result};
use crate::handle::LiveRestoreFile;
use crate::os::OsFilesystem;
use crate::paths::{self, Layer};
use crate::types::{DebugFlags, FileType, LayerKind, OpenFlags};

/// Shared, immutable-after-mount state; the panic flag is the only mutable
/// field. Every handle keeps an [`Arc`] back to this.
pub(crate) struct MountState<S: OsFilesystem> {
    pub(crate) os: S,
    pub(crate) destination: Layer,
    pub(crate) source: Layer,
    pub(crate) threads_max: usize,
    pub(crate) debug_flags: DebugFlags,
    panicked: AtomicBool,
}

impl<S: OsFilesystem> MountState<S> {
    /// Resolve a logical name to its backing path in the given layer.
    pub(crate) fn resolve(&self, which: LayerKind, name: &Path) -> PathBuf {
        let layer = match which {
            LayerKind::Destination => &self.destination,
            LayerKind::Source => &self.source,
        };
        layer.resolve(&self.destination.home, name)
    }

    /// Whether the given layer holds a backing file for `name`.
    pub(crate) fn has_file(&self, which: LayerKind, name: &Path) -> Result<bool> {
        Ok(self.os.exist(&self.resolve(which, name))?)
    }

    /// Which layer holds `name`, probing destination first. Tombstones are
    /// not consulted here; callers that care about source visibility check
    /// them separately.
    pub(crate) fn find_layer(&self, name: &Path) -> Result<Option<LayerKind>> {
        if self.has_file(LayerKind::Destination, name)? {
            return Ok(Some(LayerKind::Destination));
        }
        if self.has_file(LayerKind::Source, name)? {
            return Ok(Some(LayerKind::Source));
        }
        Ok(None)
    }

    /// Whether a tombstone exists for the given destination-side path.
    pub(crate) fn has_tombstone(&self, dest_path: &Path) -> Result<bool> {
        let marker = paths::tombstone_path(dest_path);
        let exists = self.os.exist(&marker)?;
        debug!(marker = %marker.display(), exists, "tombstone check");
        Ok(exists)
    }

    /// Create a tombstone for `name`: a zero-byte sibling of the
    /// destination-side path. The caller's `DURABLE` flag carries over so a
    /// durable remove produces a durable marker.
    pub(crate) fn create_tombstone(&self, name: &Path, flags: OpenFlags) -> Result<()> {
        let marker = paths::tombstone_path(&self.resolve(LayerKind::Destination, name));
        let mut open_flags = OpenFlags::CREATE;
        if flags.contains(OpenFlags::DURABLE) {
            open_flags |= OpenFlags::DURABLE;
        }
        debug!(marker = %marker.display(), "creating tombstone");
        drop(self.os.open(&marker, FileType::Regular, open_flags)?);
        Ok(())
    }

    pub(crate) fn panicked(&self) -> bool {
        self.panicked.load(Ordering::Acquire)
    }
}

/// A live-restore file system over the OS backend `S`.
///
/// Presents the destination layer as the single authoritative tree while
/// transparently filling it from the read-only source. Cloning is cheap and
/// shares the mount state; the mount tears down when the last clone and the
/// last open handle drop.
pub struct LiveRestoreFs<S: OsFilesystem> {
    state: Arc<MountState<S>>,
}

impl<S: OsFilesystem> std::fmt::Debug for LiveRestoreFs<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveRestoreFs").finish_non_exhaustive()
    }
}

impl<S: OsFilesystem> Clone for LiveRestoreFs<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: OsFilesystem> LiveRestoreFs<S> {
    /// Mount a live-restore file system.
    ///
    /// `destination_home` is the engine's home directory (the writable
    /// layer); `config.path` is the read-only source home, which must exist
    /// and be listable.
    pub fn mount(os: S, destination_home: impl Into<PathBuf>, config: &LiveRestoreConfig) -> Result<Self> {
        let destination_home = destination_home.into();
        let source_home = config.path.clone();

        // Fail the mount rather than the first read if the source home is
        // absent or unreadable.
        os.directory_list(&source_home, "").map_err(|err| {
            FsError::InvalidInput(format!(
                "live restore source path {} cannot be listed: {err}",
                source_home.display()
            ))
        })?;

        info!(
            source = %source_home.display(),
            destination = %destination_home.display(),
            "live restore mounted"
        );

        Ok(Self {
            state: Arc::new(MountState {
                os,
                destination: Layer {
                    home: destination_home,
                    kind: LayerKind::Destination,
                },
                source: Layer {
                    home: source_home,
                    kind: LayerKind::Source,
                },
                threads_max: config.threads_max,
                debug_flags: config.debug.to_flags(),
                panicked: AtomicBool::new(false),
            }),
        })
    }

    /// Whether `name` exists in the logical tree.
    ///
    /// A destination file always exists; a source-only file exists unless a
    /// tombstone marks it deleted.
    pub fn exist(&self, name: &Path) -> Result<bool> {
        match self.state.find_layer(name)? {
            Some(LayerKind::Destination) => Ok(true),
            Some(LayerKind::Source) => {
                let dest_path = self.state.resolve(LayerKind::Destination, name);
                Ok(!self.state.has_tombstone(&dest_path)?)
            }
            None => Ok(false),
        }
    }

    /// The merged listing of the logical directory `dir`, filtered to names
    /// beginning with `prefix`.
    ///
    /// Destination entries (minus tombstone markers) come first, then source
    /// entries that are neither shadowed by a destination file nor
    /// tombstoned. A directory missing on either side contributes nothing.
    pub fn directory_list(&self, dir: &Path, prefix: &str) -> Result<Vec<String>> {
        self.directory_list_worker(dir, prefix, false)
    }

    /// The first eligible entry of the merged listing, if any.
    pub fn directory_list_single(&self, dir: &Path, prefix: &str) -> Result<Option<String>> {
        Ok(self
            .directory_list_worker(dir, prefix, true)?
            .into_iter()
            .next())
    }

    fn directory_list_worker(&self, dir: &Path, prefix: &str, single: bool) -> Result<Vec<String>> {
        debug!(dir = %dir.display(), prefix, single, "directory list");
        let state = &self.state;
        let dest_dir = state.resolve(LayerKind::Destination, dir);
        let mut entries = Vec::new();

        for name in list_or_empty(&state.os, &dest_dir, prefix)? {
            if paths::is_tombstone_name(&name) {
                continue;
            }
            entries.push(name);
            if single {
                return Ok(entries);
            }
        }

        let source_dir = state.resolve(LayerKind::Source, dir);
        for name in list_or_empty(&state.os, &source_dir, prefix)? {
            // A destination copy or a tombstone makes the source entry
            // invisible.
            let dest_side = dest_dir.join(&name);
            if state.os.exist(&dest_side)? || state.has_tombstone(&dest_side)? {
                continue;
            }
            entries.push(name);
            if single {
                break;
            }
        }
        Ok(entries)
    }

    /// Open a live-restore file handle for `name`.
    ///
    /// If the source holds the file and no tombstone exists, the handle
    /// carries a source handle and a hole list describing the un-migrated
    /// ranges; otherwise the destination is complete from the start.
    #[instrument(level = "debug", skip_all, fields(name = %name.display()))]
    pub fn open_file(
        &self,
        name: &Path,
        file_type: FileType,
        flags: OpenFlags,
    ) -> Result<LiveRestoreFile<S>> {
        LiveRestoreFile::open(Arc::clone(&self.state), name, file_type, flags)
    }

    /// Remove `name` from the logical tree.
    ///
    /// Deletes the destination copy when one exists, then tombstones the
    /// name so the source copy stays invisible, even for a file that is
    /// later re-created with the same name. Removing a name that exists
    /// nowhere is a no-op.
    #[instrument(level = "debug", skip_all, fields(name = %name.display()))]
    pub fn remove(&self, name: &Path, flags: OpenFlags) -> Result<()> {
        let Some(which) = self.state.find_layer(name)? else {
            return Ok(());
        };
        if which == LayerKind::Destination {
            let dest_path = self.state.resolve(LayerKind::Destination, name);
            self.state.os.remove(&dest_path, flags)?;
        }
        self.state.create_tombstone(name, flags)
    }

    /// Rename `from` to `to` in the logical tree.
    ///
    /// The destination-side file is renamed when one exists; both names are
    /// tombstoned regardless, so neither old source copy resurfaces.
    #[instrument(level = "debug", skip_all, fields(from = %from.display(), to = %to.display()))]
    pub fn rename(&self, from: &Path, to: &Path, flags: OpenFlags) -> Result<()> {
        let Some(which) = self.state.find_layer(from)? else {
            return Err(FsError::NotFound {
                name: from.to_path_buf(),
            });
        };
        if which == LayerKind::Destination {
            let dest_from = self.state.resolve(LayerKind::Destination, from);
            let dest_to = self.state.resolve(LayerKind::Destination, to);
            self.state.os.rename(&dest_from, &dest_to, flags)?;
        }
        self.state.create_tombstone(to, flags)?;
        self.state.create_tombstone(from, flags)
    }

    /// The size of `name`, read from the destination layer, which is
    /// authoritative for any file the engine works with.
    pub fn size(&self, name: &Path) -> Result<u64> {
        let Some(which) = self.state.find_layer(name)? else {
            return Err(FsError::NotFound {
                name: name.to_path_buf(),
            });
        };
        debug_assert_eq!(
            which,
            LayerKind::Destination,
            "size of a file that was never opened into the destination"
        );
        let dest_path = self.state.resolve(LayerKind::Destination, name);
        Ok(self.state.os.size(&dest_path)?)
    }

    /// Mark the mount panicked. Background fill observes the flag between
    /// iterations and aborts.
    pub fn set_panic(&self) {
        self.state.panicked.store(true, Ordering::Release);
    }

    /// Whether the mount has been marked panicked.
    #[must_use]
    pub fn panicked(&self) -> bool {
        self.state.panicked()
    }

    /// The configured cap on background fill workers.
    #[must_use]
    pub fn threads_max(&self) -> usize {
        self.state.threads_max
    }
}

/// List a directory, treating a missing directory as empty.
fn list_or_empty<S: OsFilesystem>(os: &S, dir: &Path, prefix: &str) -> Result<Vec<String>> {
    match os.directory_list(dir, prefix) {
        Ok(entries) => Ok(entries),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}
