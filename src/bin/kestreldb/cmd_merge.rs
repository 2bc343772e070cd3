use anyhow::Result;
use std::path::PathBuf;

use super::util::open_store;

pub fn exec(path: PathBuf) -> Result<()> {
    let db = open_store(path)?;
    let before = db.stat()?;
    db.merge(true)?;
    let after = db.stat()?;
    db.close()?;
    println!(
        "MERGE done: {} keys, disk {} B -> {} B",
        after.keys_num, before.disk_size, after.disk_size
    );
    Ok(())
}
