use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use KestrelDB::metrics;

use super::util::open_store;

pub fn exec(path: PathBuf, timeout_ms: u64) -> Result<()> {
    let db = open_store(path)?;
    let before = metrics::snapshot().expired_keys_removed;
    db.delete_expired_keys(Duration::from_millis(timeout_ms))?;
    let removed = metrics::snapshot().expired_keys_removed - before;
    db.close()?;
    println!("SWEEP done: {} expired keys removed", removed);
    Ok(())
}
