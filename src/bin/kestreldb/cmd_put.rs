use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use super::util::{open_store, read_value};

pub fn exec(
    path: PathBuf,
    key: String,
    value: Option<String>,
    value_file: Option<PathBuf>,
    ttl: Option<u64>,
) -> Result<()> {
    let db = open_store(path)?;
    let value = read_value(value, value_file)?;
    match ttl {
        Some(secs) => db.put_with_ttl(key.as_bytes(), &value, Duration::from_secs(secs))?,
        None => db.put(key.as_bytes(), &value)?,
    }
    db.close()?;
    println!("OK '{}': {} B", key, value.len());
    Ok(())
}
