//! Errors surfaced by the layered file system.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for results carrying [`FsError`].
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors produced by layered file-system operations.
///
/// OS-layer failures are propagated verbatim as [`FsError::Io`]; local
/// recovery is limited to releasing transient state on the way out.
/// Contract violations by the caller (a logical name outside the destination
/// home, a read partially overlapping a hole) are panics, not errors.
#[derive(Debug, Error)]
pub enum FsError {
    /// The named file exists in neither layer.
    #[error("live restore cannot find: {name}")]
    NotFound {
        /// The logical name that failed to resolve.
        name: PathBuf,
    },

    /// Recovered per-file state is inconsistent, e.g. a hole list extending
    /// past the end of the source file. Reading through such a hole would
    /// copy undefined bytes into the destination, so the open fails instead.
    #[error("invalid live restore state: {0}")]
    InvalidInput(String),

    /// The operation is intentionally unimplemented for this layer.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// An OS-layer failure, unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The mount-wide panic flag was observed; long-running background work
    /// aborts promptly instead of continuing to touch the destination.
    #[error("connection panicked; live restore work aborted")]
    Panicked,
}
