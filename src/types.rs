//! Flag and type definitions shared across the layered file system.

use bitflags::bitflags;

bitflags! {
    /// Flags accepted by [`open_file`](crate::fs::LiveRestoreFs::open_file)
    /// and forwarded to the OS layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Create the file if it does not exist.
        const CREATE    = 1 << 0;
        /// Open read-only.
        const READONLY  = 1 << 1;
        /// Make the operation durable: sync the file (and, for namespace
        /// operations, its parent directory) before returning.
        const DURABLE   = 1 << 2;
        /// Fail if the file already exists (with `CREATE`).
        const EXCLUSIVE = 1 << 3;
    }
}

bitflags! {
    /// Debug behaviors enabled at mount time.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DebugFlags: u32 {
        /// Drain every remaining hole before a file handle closes.
        const FILL_HOLES_ON_CLOSE = 1 << 0;
    }
}

/// The kind of file being opened.
///
/// The layered file system only services regular files; directories are
/// validated and listed by path, never opened as handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Engine data file (block-aligned I/O).
    Data,
    /// Engine log file.
    Log,
    /// Any other regular file.
    Regular,
    /// A directory. Opening one is not supported.
    Directory,
}

/// Which layer of the file system a name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// The writable layer that will become the authoritative copy.
    Destination,
    /// The read-only layer providing initial data.
    Source,
}
