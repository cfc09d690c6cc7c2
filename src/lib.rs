//! Layered live-restore file system.
//!
//! A [`LiveRestoreFs`] presents a single logical directory tree to a storage
//! engine while data migrates from a read-only *source* layer into a writable
//! *destination* layer. Reads of ranges that have not yet been copied are
//! transparently serviced from the source and promoted into the destination;
//! each open file tracks the byte ranges still to be copied as a list of
//! *holes*, persisted implicitly as sparse-file holes in the destination.
//! Deletions are recorded as on-disk tombstone markers so the source copy of
//! a removed name stays invisible across restarts. Background workers drain
//! the remaining holes until the destination is self-sufficient and the
//! source can be detached.

/// Mount configuration.
pub mod config;
/// Error taxonomy for layered file-system operations.
pub mod error;
/// Background hole-fill workers.
pub mod fill;
/// The layered file system: namespace operations and mount state.
pub mod fs;
/// Per-file handles: reads, writes, promotion, and hole tracking.
pub mod handle;
/// The OS file-system seam and its standard-library backend.
pub mod os;
/// Open flags, file types, and debug flags.
pub mod types;

mod extent;
mod paths;

pub use config::{DebugOptions, LiveRestoreConfig};
pub use error::{FsError, Result};
pub use fill::FillWorkers;
pub use fs::LiveRestoreFs;
pub use handle::LiveRestoreFile;
pub use os::{OsFile, OsFilesystem, StdFilesystem};
pub use types::{FileType, OpenFlags};
