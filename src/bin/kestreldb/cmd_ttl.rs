use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use KestrelDB::Error;

use super::util::open_store;

pub fn exec_ttl(path: PathBuf, key: String) -> Result<()> {
    let db = open_store(path)?;
    let res = db.ttl(key.as_bytes());
    db.close()?;
    match res {
        Ok(Some(d)) => println!("TTL '{}': {:.3} s", key, d.as_secs_f64()),
        Ok(None) => println!("TTL '{}': never expires", key),
        Err(Error::KeyNotFound) => println!("NOT FOUND '{}'", key),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn exec_expire(path: PathBuf, key: String, ttl: u64) -> Result<()> {
    let db = open_store(path)?;
    let res = db.expire(key.as_bytes(), Duration::from_secs(ttl));
    db.close()?;
    match res {
        Ok(()) => println!("OK '{}': expires in {} s", key, ttl),
        Err(Error::KeyNotFound) => println!("NOT FOUND '{}'", key),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn exec_persist(path: PathBuf, key: String) -> Result<()> {
    let db = open_store(path)?;
    let res = db.persist(key.as_bytes());
    db.close()?;
    match res {
        Ok(()) => println!("OK '{}': never expires", key),
        Err(Error::KeyNotFound) => println!("NOT FOUND '{}'", key),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
