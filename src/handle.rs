//! Per-file handles.
//!
//! A [`LiveRestoreFile`] wraps a destination handle and, while migration is
//! still in progress, a source handle. The hole list describing un-migrated
//! ranges lives behind one mutex together with the `complete` flag; every
//! operation that consults or mutates it holds that mutex across the I/O and
//! the list update, so a reader that observes a range as serviced also
//! observes the bytes the corresponding write made durable.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use crate::error::{FsError, Result};
use crate::extent::HoleList;
use crate::fs::MountState;
use crate::os::{OsFile, OsFilesystem};
use crate::types::{DebugFlags, FileType, LayerKind, OpenFlags};

/// Hole list plus completion flag, mutated only under the handle's mutex.
struct HandleState {
    holes: HoleList,
    /// Once set the source is never consulted again for this handle; the
    /// hole list is empty from that point on.
    complete: bool,
}

/// An open file in the layered file system.
///
/// Exclusively owned by its opener, though operations take `&self` and the
/// handle may be shared with background fill through an [`Arc`]. Dropping
/// the handle closes both layer handles; [`close`](Self::close) additionally
/// runs the fill-on-close debug behavior when enabled.
pub struct LiveRestoreFile<S: OsFilesystem> {
    name: PathBuf,
    dest: S::File,
    source: Option<S::File>,
    state: Mutex<HandleState>,
    mount: Arc<MountState<S>>,
}

impl<S: OsFilesystem> std::fmt::Debug for LiveRestoreFile<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveRestoreFile")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<S: OsFilesystem> LiveRestoreFile<S> {
    /// Open a handle for the logical `name`.
    ///
    /// The destination file is opened (created when absent), its sparse
    /// layout is turned back into a hole list, and the source file is opened
    /// when it exists and no tombstone shadows it. A freshly created
    /// destination backed by a source file is extended to the source length
    /// and starts as one whole-file hole.
    pub(crate) fn open(
        mount: Arc<MountState<S>>,
        name: &Path,
        file_type: FileType,
        flags: OpenFlags,
    ) -> Result<Self> {
        if file_type == FileType::Directory {
            return Err(FsError::NotSupported(
                "opening a directory through the live restore layer",
            ));
        }

        let dest_path = mount.resolve(LayerKind::Destination, name);
        let dest_exists = mount.os.exist(&dest_path)?;
        // The destination handle stays writable even for read-only opens:
        // servicing a read from source promotes the bytes through it.
        let mut dest_flags = flags - OpenFlags::READONLY;
        if !dest_exists {
            dest_flags |= OpenFlags::CREATE;
        }
        let dest = mount.os.open(&dest_path, file_type, dest_flags)?;
        debug!(name = %name.display(), dest_exists, "opened destination file");

        // An existing destination file's sparse layout is the persisted
        // form of its hole list.
        let mut holes = if dest_exists {
            Self::discover_holes(&dest)?
        } else {
            HoleList::new()
        };

        let mut complete = false;
        let mut source = None;
        if mount.has_tombstone(&dest_path)? {
            // The name was deleted (and possibly re-created): whatever the
            // destination holds is authoritative and the source copy is
            // dead.
            complete = true;
            holes.clear();
        } else {
            let source_path = mount.resolve(LayerKind::Source, name);
            if mount.os.exist(&source_path)? {
                // The create flag comes from a caller with no concept of
                // layers; never create (or exclusively create) in source.
                let source_flags =
                    (flags - (OpenFlags::CREATE | OpenFlags::EXCLUSIVE)) | OpenFlags::READONLY;
                let source_file = mount.os.open(&source_path, file_type, source_flags)?;

                if !dest_exists {
                    // Fresh destination backed by a source file: give it the
                    // source length via the bare handle (bypassing the hole
                    // list) and seed the single whole-file hole.
                    let source_size = source_file.size()?;
                    debug!(
                        name = %name.display(),
                        source_size,
                        "backing new destination file with source extent"
                    );
                    dest.truncate(source_size)?;
                    holes = HoleList::whole_file(source_size);
                }
                source = Some(source_file);
            } else {
                // No source copy: the destination is complete by definition.
                complete = true;
            }
        }

        Self::verify_holes(&holes, source.as_ref(), name)?;

        Ok(Self {
            name: name.to_path_buf(),
            dest,
            source,
            state: Mutex::new(HandleState { holes, complete }),
            mount,
        })
    }

    /// Rebuild the hole list of an existing destination file from its
    /// sparse layout: start with one whole-file hole, then subtract every
    /// allocated range.
    fn discover_holes(dest: &S::File) -> Result<HoleList> {
        let size = dest.size()?;
        let mut holes = HoleList::whole_file(size);
        for (start, end) in dest.allocated_ranges()? {
            holes.remove_range(start, end - start);
        }
        Ok(holes)
    }

    /// A hole list may not reach past the end of the source file, and may
    /// not exist at all without a source file; reading through such a hole
    /// would copy undefined bytes into the destination.
    fn verify_holes(holes: &HoleList, source: Option<&S::File>, name: &Path) -> Result<()> {
        let Some(last_end) = holes.last_end() else {
            return Ok(());
        };
        match source {
            Some(source_file) => {
                let source_size = source_file.size()?;
                if last_end >= source_size {
                    error!(
                        name = %name.display(),
                        last_end,
                        source_size,
                        "hole list extends past the end of the source file"
                    );
                    holes.dump(name);
                    return Err(FsError::InvalidInput(format!(
                        "hole list for {} extends past the end of the source file",
                        name.display()
                    )));
                }
            }
            None => {
                holes.dump(name);
                return Err(FsError::InvalidInput(format!(
                    "{} has un-migrated ranges but no source file to fill them",
                    name.display()
                )));
            }
        }
        Ok(())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HandleState> {
        // A panic mid-operation can only leave extra holes behind, which is
        // the safe direction: the range is re-fetched from source.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `buf` at `offset`.
    ///
    /// Writes go to the destination only. The data is made durable before
    /// the hole list records the range as serviced, so a crash between the
    /// two re-fetches from source rather than trusting unsynced bytes.
    pub fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        debug!(name = %self.name.display(), offset, len = buf.len(), "write");
        let mut state = self.lock_state();
        self.write_locked(&mut state, offset, buf)
    }

    fn write_locked(&self, state: &mut HandleState, offset: u64, buf: &[u8]) -> Result<()> {
        self.dest.write_at(buf, offset)?;
        self.dest.sync()?;
        state.holes.remove_range(offset, buf.len() as u64);
        Ok(())
    }

    /// Read `buf.len()` bytes at `offset`.
    ///
    /// Serviced from the destination when the handle is complete, no source
    /// handle exists, or the range holds no hole; otherwise the bytes come
    /// from the source and are promoted into the destination on the way
    /// through.
    ///
    /// # Panics
    ///
    /// Panics when the range partially overlaps a hole; callers are
    /// expected to issue block-aligned, hole-aligned reads.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        debug!(name = %self.name.display(), offset, len = buf.len(), "read");
        if buf.is_empty() {
            return Ok(());
        }
        let mut state = self.lock_state();
        let serviceable = state.complete
            || self.source.is_none()
            || state.holes.can_service(offset, buf.len() as u64);
        if serviceable {
            debug!(name = %self.name.display(), "read from destination");
            self.dest.read_at(buf, offset)?;
            return Ok(());
        }
        let Some(source) = self.source.as_ref() else {
            unreachable!("unserviceable read without a source handle");
        };
        debug!(name = %self.name.display(), "read from source");
        source.read_at(buf, offset)?;
        // Promote: capture the bytes locally so later reads stay out of the
        // source, and account for them in the hole list.
        debug!(name = %self.name.display(), offset, len = buf.len(), "read promote");
        self.write_locked(&mut state, offset, buf)
    }

    /// Truncate (or extend) the destination file to `len` bytes.
    ///
    /// Either way the affected range will never be read from the source
    /// again, so its holes are dropped first. The source file is never
    /// truncated; extended ranges read as destination zeros from here on.
    pub fn truncate(&self, len: u64) -> Result<()> {
        let mut state = self.lock_state();
        let old_len = self.dest.size()?;
        if old_len == len {
            // Truncate to the current length is common and a no-op.
            return Ok(());
        }
        debug!(name = %self.name.display(), old_len, len, "truncate");
        let start = old_len.min(len);
        let end = old_len.max(len);
        state.holes.remove_range(start, end - start);
        self.dest.truncate(len)?;
        Ok(())
    }

    /// The destination file size, which is authoritative.
    pub fn size(&self) -> Result<u64> {
        Ok(self.dest.size()?)
    }

    /// Sync the destination file. The source is read-only and never synced.
    pub fn sync(&self) -> Result<()> {
        Ok(self.dest.sync()?)
    }

    /// Acquire or release the destination file's lock.
    pub fn lock(&self, lock: bool) -> Result<()> {
        Ok(self.dest.lock(lock)?)
    }

    /// Promote the first `buf.len()`-or-fewer bytes of the head hole,
    /// shrinking or removing it. Returns `false` once no holes remain.
    ///
    /// Reading from the head each call is deliberate: foreground writes
    /// mutate the list between calls, so the head observed last time may be
    /// gone.
    pub(crate) fn promote_head_chunk(&self, buf: &mut [u8]) -> Result<bool> {
        let mut state = self.lock_state();
        let Some((offset, len)) = state.holes.first() else {
            return Ok(false);
        };
        let chunk = usize::try_from(len.min(buf.len() as u64)).unwrap_or(buf.len());
        let Some(source) = self.source.as_ref() else {
            unreachable!("hole list without a source file");
        };
        debug!(
            name = %self.name.display(),
            offset,
            len = chunk,
            "promoting head hole chunk"
        );
        source.read_at(&mut buf[..chunk], offset)?;
        self.write_locked(&mut state, offset, &buf[..chunk])
            .map(|()| true)
    }

    /// Copy every remaining hole from the source into the destination.
    ///
    /// Large holes are promoted in 4 KiB chunks, re-reading the list head
    /// each iteration because the promotion itself shrinks it. Aborts with
    /// [`FsError::Panicked`] as soon as the mount-wide panic flag is seen.
    pub fn fill_holes(&self) -> Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            if self.mount.panicked() {
                return Err(FsError::Panicked);
            }
            if !self.promote_head_chunk(&mut buf)? {
                return Ok(());
            }
        }
    }

    /// Close the handle.
    ///
    /// With the fill-on-close debug behavior enabled, every remaining hole
    /// is promoted first, so the destination file is left complete.
    pub fn close(self) -> Result<()> {
        debug!(name = %self.name.display(), "closing file");
        if self
            .mount
            .debug_flags
            .contains(DebugFlags::FILL_HOLES_ON_CLOSE)
        {
            self.fill_holes()?;
        }
        // Both layer handles and the hole list release on drop.
        Ok(())
    }

    /// The logical name this handle was opened with.
    #[must_use]
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Whether the destination is authoritative for the whole file.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.lock_state().complete
    }

    /// The un-migrated ranges as `(offset, len)` pairs, in offset order.
    /// Exposed for verification; the list mutates under concurrent writes.
    #[must_use]
    pub fn remaining_holes(&self) -> Vec<(u64, u64)> {
        self.lock_state().holes.ranges()
    }
}
