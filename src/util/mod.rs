//! util — общие утилиты (вынесено из разных модулей).
//!
//! Содержит:
//! - now_nanos(): текущее Unix-время в наносекундах (i64, saturating).
//! - dir_size(): суммарный размер файлов каталога (без рекурсии).

use std::path::Path;

/// Текущее Unix-время в наносекундах, обрезанное к i64 (saturating).
#[inline]
pub fn now_nanos() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_nanos()).min(i64::MAX as u128) as i64
}

/// Суммарный размер файлов каталога в байтах.
///
/// Каталог движка плоский (сегменты, hint, маркер, LOCK), поэтому
/// вложенные каталоги не учитываются.
pub fn dir_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            total = total.saturating_add(meta.len());
        }
    }
    Ok(total)
}
