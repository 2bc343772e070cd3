//! db — high-level API движка.
//!
//! Разделение:
//! - core.rs  — структура Db, stat/sync/watch/close, фоновые задачи.
//! - open.rs  — open(): блокировка каталога, усвоение merge-остатков,
//!              восстановление индекса (hint + скан с границами батчей).
//! - batch.rs — Batch: overlay отложенных записей, двухфазный коммит,
//!              rollback.
//! - kv.rs    — одиночные операции как одноразовые батчи; сканы; sweep TTL.
//! - merge.rs — компактация в соседний каталог + hint/finished-маркер.
//! - watch.rs — кольцо событий и поток доставки.

mod batch;
mod core;
mod kv;
mod merge;
mod open;
mod watch;

pub use batch::Batch;
pub use self::core::{Db, Stat};
pub use watch::{Event, WatchAction, Watcher};

pub(crate) use merge::{load_merge_files, merge_fin_segment_id};

/// Суффиксы файлов движка.
pub const DATA_FILE_SUFFIX: &str = ".SEG";
pub const HINT_FILE_SUFFIX: &str = ".HINT";
pub const MERGE_FIN_SUFFIX: &str = ".MERGEFIN";
