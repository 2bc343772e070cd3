use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;

use KestrelDB::Error;

use super::util::{display_text, open_store};

pub fn exec(path: PathBuf, key: String, out: Option<PathBuf>) -> Result<()> {
    let db = open_store(path)?;
    let res = db.get(key.as_bytes());
    db.close()?;
    match res {
        Ok(v) => {
            if let Some(out_path) = out {
                let mut f = std::fs::File::create(&out_path)?;
                f.write_all(&v)?;
                f.sync_all()?;
                println!("FOUND '{}': {} B -> wrote to {}", key, v.len(), out_path.display());
            } else {
                println!("FOUND '{}': {} B", key, v.len());
                println!("text: {}", display_text(&v));
            }
            Ok(())
        }
        Err(Error::KeyNotFound) => {
            println!("NOT FOUND '{}'", key);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
