use anyhow::Result;
use std::path::PathBuf;

use super::util::open_store;

pub fn exec(path: PathBuf, key: String) -> Result<()> {
    let db = open_store(path)?;
    db.delete(key.as_bytes())?;
    db.close()?;
    println!("DELETED '{}'", key);
    Ok(())
}
