//! Centralized configuration for KestrelDB.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering them per module.
//! - `Options::default()` gives a working single-process store; fluent
//!   `with_*` setters override specific fields.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{Error, Result};

/// Top-level configuration for a KestrelDB engine instance.
#[derive(Clone, Debug)]
pub struct Options {
    /// Directory where the segment files are stored.
    pub dir_path: PathBuf,

    /// Maximum size of each segment file in bytes. The active segment is
    /// rotated once the next write would exceed this size.
    pub segment_size: u64,

    /// Whether to fsync the active segment after every committed write set.
    ///
    /// If false and the machine crashes, some recent writes may be lost.
    /// If just the process crashes (machine does not), no writes are lost.
    pub sync: bool,

    /// Number of bytes to write before forcing an fsync (0 disables the
    /// threshold). Ignored when `sync` is already true.
    pub bytes_per_sync: u64,

    /// Capacity of the watch event ring. 0 disables watch entirely;
    /// a ring of capacity N retains at most N-1 undelivered events.
    pub watch_queue_size: u64,

    /// Interval between automatic merge passes. None disables auto-merge.
    /// Each pass runs `merge(true)`, so the index is rebuilt afterwards.
    /// Do not set this too low; a merge rewrites all older segments.
    pub auto_merge_interval: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("kestrel-data"),
            segment_size: 1024 * 1024 * 1024,
            sync: false,
            bytes_per_sync: 0,
            watch_queue_size: 0,
            auto_merge_interval: None,
        }
    }
}

impl Options {
    pub fn with_dir_path<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dir_path = dir.into();
        self
    }

    pub fn with_segment_size(mut self, bytes: u64) -> Self {
        self.segment_size = bytes;
        self
    }

    pub fn with_sync(mut self, on: bool) -> Self {
        self.sync = on;
        self
    }

    pub fn with_bytes_per_sync(mut self, bytes: u64) -> Self {
        self.bytes_per_sync = bytes;
        self
    }

    pub fn with_watch_queue_size(mut self, capacity: u64) -> Self {
        self.watch_queue_size = capacity;
        self
    }

    pub fn with_auto_merge_interval(mut self, interval: Option<Duration>) -> Self {
        self.auto_merge_interval = interval;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(Error::InvalidOptions("database directory path is empty"));
        }
        if self.segment_size == 0 {
            return Err(Error::InvalidOptions("database segment size must be positive"));
        }
        Ok(())
    }
}

/// Per-batch options.
#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    /// Fsync the segment log once the batch's write set is appended.
    /// Redundant (and skipped) when the engine-wide `Options::sync` is set.
    pub sync: bool,

    /// A read-only batch holds the engine lock in shared mode and rejects
    /// mutations with `ReadOnlyBatch`.
    pub read_only: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            sync: true,
            read_only: false,
        }
    }
}

impl BatchOptions {
    pub fn read_only() -> Self {
        Self {
            sync: false,
            read_only: true,
        }
    }

    pub fn with_sync(mut self, on: bool) -> Self {
        self.sync = on;
        self
    }
}
