#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod errors;
pub mod ids;
pub mod lock;
pub mod metrics;
pub mod record;

// Модульная раскладка (папки с mod.rs)
pub mod wal;   // src/wal/{mod,segment,writer,reader}.rs
pub mod index; // src/index/mod.rs
pub mod db;    // src/db/{mod,core,open,kv,batch,merge,watch}.rs

// Утилиты (now_nanos, dir_size, ...)
pub mod util; // src/util/mod.rs

// Удобные реэкспорты
pub use config::{BatchOptions, Options};
pub use db::{Batch, Db, Event, Stat, WatchAction, Watcher};
pub use errors::{Error, Result};
pub use record::{LogRecord, LogRecordType};
pub use wal::Position;
