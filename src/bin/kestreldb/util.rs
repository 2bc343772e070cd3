use anyhow::Result;
use std::io::Read;
use std::path::PathBuf;

use KestrelDB::{Db, Options};
use std::sync::Arc;

/// Открыть движок для одноразовой CLI-операции.
pub fn open_store(path: PathBuf) -> Result<Arc<Db>> {
    let db = Db::open(Options::default().with_dir_path(path))?;
    Ok(db)
}

/// Значение из аргументов: литерал, файл или stdin ("-").
pub fn read_value(value: Option<String>, value_file: Option<PathBuf>) -> Result<Vec<u8>> {
    if let Some(path) = value_file {
        return Ok(std::fs::read(&path)?);
    }
    match value.as_deref() {
        Some("-") => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
        Some(s) => Ok(s.as_bytes().to_vec()),
        None => Ok(Vec::new()),
    }
}

pub fn display_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => format!("(binary {} B)", bytes.len()),
    }
}
