//! db/core — структура Db, stat/sync/watch/close.
//!
//! Модель блокировок: одна общая RwLock движка (`mu`) сериализует пишущие
//! батчи между собой и с читателями; read-only батчи берут её в shared
//! режиме. Сам сегментный лог дополнительно сериализует свои append'ы.
//! Единственный эксклюзивный участок компактации — ротация активного
//! сегмента.

use crossbeam_channel::Receiver;
use log::warn;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use crate::config::Options;
use crate::errors::{Error, Result};
use crate::ids::BatchIdGenerator;
use crate::index::BTreeIndex;
use crate::lock::LockGuard;
use crate::util::dir_size;
use crate::wal::SegmentLog;

use super::watch::{Event, Watcher};

pub struct Db {
    pub(crate) options: Options,
    /// Сегментный лог данных. Write-гард берётся только при подмене лога
    /// (усвоение merge) — все остальные пути ходят через read-гард.
    pub(crate) data_files: RwLock<SegmentLog>,
    pub(crate) index: BTreeIndex,
    /// Engine-wide lock: пишущие батчи — exclusive, читающие — shared.
    pub(crate) mu: RwLock<()>,
    pub(crate) closed: AtomicBool,
    pub(crate) merge_running: AtomicBool,
    pub(crate) batch_ids: BatchIdGenerator,
    pub(crate) watcher: Option<Arc<Watcher>>,
    pub(crate) watch_rx: Option<Receiver<Event>>,
    /// Курсор инкрементального sweep'а просроченных ключей.
    pub(crate) expired_cursor: Mutex<Option<Vec<u8>>>,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) threads: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) _file_lock: LockGuard,
}

/// Статистика движка.
#[derive(Debug, Clone, Serialize)]
pub struct Stat {
    /// Число живых ключей в индексе.
    pub keys_num: usize,
    /// Размер каталога движка на диске, в байтах.
    pub disk_size: u64,
}

impl Db {
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Принудительный fsync активного сегмента.
    pub fn sync(&self) -> Result<()> {
        let _guard = self.mu.write().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        self.data_files.read().unwrap().sync()
    }

    /// Статистика движка, читается под общей блокировкой.
    pub fn stat(&self) -> Result<Stat> {
        let _guard = self.mu.read().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        Ok(Stat {
            keys_num: self.index.len(),
            disk_size: dir_size(&self.options.dir_path)?,
        })
    }

    /// Канал событий watch. `WatchDisabled`, если при открытии
    /// `watch_queue_size` был нулевым.
    pub fn watch(&self) -> Result<Receiver<Event>> {
        match &self.watch_rx {
            Some(rx) => Ok(rx.clone()),
            None => Err(Error::WatchDisabled),
        }
    }

    /// Идемпотентное закрытие: fsync лога, остановка фоновых потоков,
    /// установка closed-флага. Файловая блокировка каталога снимается при
    /// Drop.
    pub fn close(&self) -> Result<()> {
        {
            let _guard = self.mu.write().unwrap();
            if self.is_closed() {
                return Ok(());
            }
            self.data_files.read().unwrap().sync()?;
            self.shutdown.store(true, Ordering::Release);
            self.closed.store(true, Ordering::Release);
        }
        // join вне блокировки: автомерж может как раз ждать её, чтобы
        // увидеть closed и выйти
        let handles: Vec<JoinHandle<()>> = self.threads.lock().unwrap().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("background thread panicked during close");
            }
        }
        Ok(())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if !self.is_closed() {
            if let Ok(log) = self.data_files.read() {
                let _ = log.sync();
            }
        }
    }
}
