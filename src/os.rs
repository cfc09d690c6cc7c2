//! The OS file-system seam.
//!
//! Every interaction with the underlying file system goes through
//! [`OsFilesystem`] and [`OsFile`], so the layered logic can be exercised
//! against any backend. [`StdFilesystem`] is the standard-library
//! implementation used in production: positional I/O via [`FileExt`],
//! advisory handle locks, and the `SEEK_DATA`/`SEEK_HOLE` scan that recovers
//! a destination file's sparse layout.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt as _;
use std::os::unix::io::AsRawFd as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::{FileType, OpenFlags};

/// An open file in the underlying file system.
///
/// All I/O is positional; the file carries no cursor. Closing is `Drop`.
pub trait OsFile: Send + Sync + 'static {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Flush file data and metadata to stable storage.
    fn sync(&self) -> io::Result<()>;

    /// Set the file length, shrinking or extending it.
    fn truncate(&self, len: u64) -> io::Result<()>;

    /// The current file length in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Acquire (`true`) or release (`false`) an exclusive advisory lock.
    fn lock(&self, lock: bool) -> io::Result<()>;

    /// The allocated (data-bearing) ranges of the file as sorted,
    /// non-overlapping `(offset, end)` pairs with exclusive ends.
    ///
    /// Ranges are reported at the file system's block granularity; a range
    /// may cover more bytes than were ever written.
    fn allocated_ranges(&self) -> io::Result<Vec<(u64, u64)>>;
}

/// The file-system operations the layered file system consumes.
pub trait OsFilesystem: Send + Sync + 'static {
    /// The handle type produced by [`open`](Self::open).
    type File: OsFile;

    /// Open `path`, honoring `flags` (`CREATE`, `READONLY`, `EXCLUSIVE`;
    /// `DURABLE` additionally syncs a newly created file).
    fn open(&self, path: &Path, file_type: FileType, flags: OpenFlags) -> io::Result<Self::File>;

    /// Whether `path` exists.
    fn exist(&self, path: &Path) -> io::Result<bool>;

    /// The size of the file at `path`.
    fn size(&self, path: &Path) -> io::Result<u64>;

    /// Remove the file at `path`. With `DURABLE`, sync the parent directory.
    fn remove(&self, path: &Path, flags: OpenFlags) -> io::Result<()>;

    /// Rename `from` to `to`. With `DURABLE`, sync the parent directory.
    fn rename(&self, from: &Path, to: &Path, flags: OpenFlags) -> io::Result<()>;

    /// The entry names in `dir` beginning with `prefix`, in no particular
    /// order. Fails with [`io::ErrorKind::NotFound`] when `dir` is missing.
    fn directory_list(&self, dir: &Path, prefix: &str) -> io::Result<Vec<String>>;
}

/// The standard-library backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystem;

impl StdFilesystem {
    /// Create the backend. It holds no state; every operation goes straight
    /// to the OS.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// An open file backed by [`std::fs::File`].
#[derive(Debug)]
pub struct StdFile {
    inner: File,
    path: PathBuf,
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    // Renames and removals become durable once the directory entry itself
    // is on disk.
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    File::open(parent)?.sync_all()
}

impl OsFilesystem for StdFilesystem {
    type File = StdFile;

    fn open(&self, path: &Path, _file_type: FileType, flags: OpenFlags) -> io::Result<Self::File> {
        let mut options = OpenOptions::new();
        options.read(true);
        options.write(!flags.contains(OpenFlags::READONLY));
        if flags.contains(OpenFlags::CREATE) {
            if flags.contains(OpenFlags::EXCLUSIVE) {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }
        let inner = options.open(path)?;
        if flags.contains(OpenFlags::CREATE) && flags.contains(OpenFlags::DURABLE) {
            inner.sync_all()?;
            sync_parent_dir(path)?;
        }
        Ok(StdFile {
            inner,
            path: path.to_path_buf(),
        })
    }

    fn exist(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn remove(&self, path: &Path, flags: OpenFlags) -> io::Result<()> {
        std::fs::remove_file(path)?;
        if flags.contains(OpenFlags::DURABLE) {
            sync_parent_dir(path)?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path, flags: OpenFlags) -> io::Result<()> {
        std::fs::rename(from, to)?;
        if flags.contains(OpenFlags::DURABLE) {
            sync_parent_dir(to)?;
        }
        Ok(())
    }

    fn directory_list(&self, dir: &Path, prefix: &str) -> io::Result<Vec<String>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) {
                entries.push(name);
            }
        }
        Ok(entries)
    }
}

impl StdFile {
    /// `lseek` wrapper returning `None` once the scan runs off the end of
    /// the file (`ENXIO`).
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn seek_from(&self, offset: u64, whence: libc::c_int) -> io::Result<Option<u64>> {
        // SAFETY: lseek only repositions the descriptor's offset; no memory
        // is passed to the kernel.
        let pos = unsafe { libc::lseek(self.inner.as_raw_fd(), offset as libc::off_t, whence) };
        if pos == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENXIO) {
                return Ok(None);
            }
            return Err(err);
        }
        Ok(Some(pos as u64))
    }
}

impl OsFile for StdFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.inner.read_exact_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.inner.write_all_at(buf, offset)
    }

    fn sync(&self) -> io::Result<()> {
        self.inner.sync_all()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    fn lock(&self, lock: bool) -> io::Result<()> {
        if lock { self.inner.lock() } else { self.inner.unlock() }
    }

    fn allocated_ranges(&self) -> io::Result<Vec<(u64, u64)>> {
        let mut ranges = Vec::new();
        let mut cursor = 0u64;
        // SEEK_DATA finds a data range even when already positioned on one,
        // so starting at zero catches data at the beginning of the file.
        while let Some(data_start) = self.seek_from(cursor, libc::SEEK_DATA)? {
            let data_end = self
                .seek_from(data_start, libc::SEEK_HOLE)?
                .ok_or_else(|| {
                    // Every data range is followed by a hole, if only the
                    // implicit one at end-of-file.
                    io::Error::other("SEEK_HOLE found no hole after data")
                })?;
            debug!(
                path = %self.path.display(),
                data_start,
                data_end,
                "allocated range"
            );
            ranges.push((data_start, data_end));
            cursor = data_end;
        }
        Ok(ranges)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn fixture() -> (StdFilesystem, tempfile::TempDir) {
        (StdFilesystem::new(), tempfile::tempdir().unwrap())
    }

    #[test]
    fn positional_io_round_trips() {
        let (fs, dir) = fixture();
        let path = dir.path().join("file.dat");
        let file = fs
            .open(&path, FileType::Data, OpenFlags::CREATE)
            .unwrap();
        file.write_at(b"hello", 4096).unwrap();

        let mut buf = [0u8; 5];
        file.read_at(&mut buf, 4096).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(file.size().unwrap(), 4101);
    }

    #[test]
    fn exclusive_create_fails_on_existing_file() {
        let (fs, dir) = fixture();
        let path = dir.path().join("file.dat");
        drop(fs.open(&path, FileType::Data, OpenFlags::CREATE).unwrap());
        let err = fs
            .open(
                &path,
                FileType::Data,
                OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
            )
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn directory_list_filters_by_prefix() {
        let (fs, dir) = fixture();
        for name in ["a.dat", "a.log", "b.dat"] {
            drop(
                fs.open(&dir.path().join(name), FileType::Data, OpenFlags::CREATE)
                    .unwrap(),
            );
        }
        let mut listed = fs.directory_list(dir.path(), "a").unwrap();
        listed.sort();
        assert_eq!(listed, vec!["a.dat", "a.log"]);

        let missing = fs.directory_list(&dir.path().join("absent"), "");
        assert_eq!(missing.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn allocated_ranges_reflect_sparse_layout() {
        let (fs, dir) = fixture();
        let path = dir.path().join("sparse.dat");
        let file = fs
            .open(&path, FileType::Data, OpenFlags::CREATE)
            .unwrap();
        file.truncate(1 << 20).unwrap();
        assert_eq!(file.allocated_ranges().unwrap(), Vec::new());

        // One block of data in the middle of the file.
        file.write_at(&[0xAA; 4096], 65536).unwrap();
        file.sync().unwrap();
        let ranges = file.allocated_ranges().unwrap();
        assert_eq!(ranges.len(), 1);
        let (start, end) = ranges[0];
        assert!(start <= 65536 && end >= 65536 + 4096, "range {start}..{end}");
        assert!(end <= 1 << 20);
    }
}
