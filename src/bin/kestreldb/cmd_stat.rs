use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use KestrelDB::metrics;

use super::util::open_store;

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let db = open_store(path.clone())?;
    let stat = db.stat()?;
    db.close()?;

    if json {
        let ms = metrics::snapshot();
        let obj = json!({
            "path": path.display().to_string(),
            "keys_num": stat.keys_num,
            "disk_size": stat.disk_size,
            "metrics": ms,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
    } else {
        println!("path:      {}", path.display());
        println!("keys:      {}", stat.keys_num);
        println!("disk size: {} B", stat.disk_size);
    }
    Ok(())
}
