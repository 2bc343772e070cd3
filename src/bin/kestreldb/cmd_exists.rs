use anyhow::Result;
use std::path::PathBuf;

use super::util::open_store;

pub fn exec(path: PathBuf, key: String) -> Result<()> {
    let db = open_store(path)?;
    let exists = db.exist(key.as_bytes())?;
    db.close()?;
    println!("{}", if exists { "EXISTS" } else { "MISSING" });
    Ok(())
}
