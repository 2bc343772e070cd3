use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Минимальный CLI для KestrelDB
#[derive(Parser, Debug)]
#[command(name = "kestreldb", version, about = "KestrelDB CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Put key/value (value as string or from file), optionally with a TTL
    Put {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
        /// Value as a literal string (UTF-8). Ignored if --value-file is set.
        #[arg(long)]
        value: Option<String>,
        /// Read value bytes from a file
        #[arg(long)]
        value_file: Option<PathBuf>,
        /// Time to live, seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Get key
    Get {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
        /// Optional file to write raw value into
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete key (tombstone write)
    Del {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// Existence check
    Exists {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// Remaining time to live of a key
    Ttl {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// Set a new time to live for a key, seconds
    Expire {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
        #[arg(long)]
        ttl: u64,
    },
    /// Remove a key's time to live
    Persist {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// Engine statistics. --json prints one JSON object with metrics.
    Stat {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a merge pass and adopt its output immediately
    Merge {
        #[arg(long)]
        path: PathBuf,
    },
    /// Tail watch events (requires a store opened with watch enabled)
    Watch {
        #[arg(long)]
        path: PathBuf,
        /// Stop after this many events
        #[arg(long, default_value_t = 16)]
        take: usize,
    },
    /// Sweep expired keys out of the index
    Sweep {
        #[arg(long)]
        path: PathBuf,
        /// Time budget for the sweep, milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },
}
