//! Mount configuration.
//!
//! The configuration is read once when the file system is mounted and is
//! immutable afterwards. It is designed to be embedded in a larger engine
//! configuration file:
//!
//! ```toml
//! [live-restore]
//! path = "/backups/2026-08-01"
//! threads-max = 8
//!
//! [live-restore.debug]
//! fill-holes-on-close = false
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::DebugFlags;

fn default_threads_max() -> usize {
    8
}

/// Configuration for a live-restore mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LiveRestoreConfig {
    /// Absolute path of the source home: the read-only directory holding the
    /// data being restored. Must exist and be listable at mount time.
    pub path: PathBuf,

    /// Maximum number of background fill workers.
    #[serde(default = "default_threads_max")]
    pub threads_max: usize,

    /// Debug behaviors, all off by default.
    #[serde(default)]
    pub debug: DebugOptions,
}

impl LiveRestoreConfig {
    /// Create a configuration with the given source home and default
    /// settings for everything else.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            threads_max: default_threads_max(),
            debug: DebugOptions::default(),
        }
    }
}

/// Debug options for a live-restore mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DebugOptions {
    /// Drain every remaining hole before a file handle closes, forcing the
    /// destination copy complete at close instead of leaving the work to
    /// background fill.
    #[serde(default)]
    pub fill_holes_on_close: bool,
}

impl DebugOptions {
    pub(crate) fn to_flags(&self) -> DebugFlags {
        let mut flags = DebugFlags::empty();
        if self.fill_holes_on_close {
            flags |= DebugFlags::FILL_HOLES_ON_CLOSE;
        }
        flags
    }
}
