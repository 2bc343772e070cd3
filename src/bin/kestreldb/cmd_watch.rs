use anyhow::Result;
use std::path::PathBuf;

use KestrelDB::{Db, Options, WatchAction};

use super::util::display_text;

/// Держит движок открытым и печатает события изменений по мере их
/// появления. Полезно вместе с параллельными put/del из другого кода,
/// работающего с тем же процессом; отдельный процесс каталог не откроет
/// (эксклюзивная блокировка).
pub fn exec(path: PathBuf, take: usize) -> Result<()> {
    let db = Db::open(Options::default().with_dir_path(path).with_watch_queue_size(1024))?;
    let events = db.watch()?;
    println!("watching {} events...", take);
    for _ in 0..take {
        let event = match events.recv() {
            Ok(e) => e,
            Err(_) => break,
        };
        let action = match event.action {
            WatchAction::Put => "PUT",
            WatchAction::Delete => "DEL",
        };
        println!(
            "{} key={} value={} batch={}",
            action,
            display_text(&event.key),
            display_text(&event.value),
            event.batch_id
        );
    }
    db.close()?;
    Ok(())
}
