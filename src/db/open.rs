//! db/open — открытие движка и восстановление индекса.
//!
//! Последовательность open():
//! 1. Валидация опций, создание каталога.
//! 2. Эксклюзивная файловая блокировка (`DatabaseIsUsing` при конфликте).
//! 3. Усвоение завершённого merge-каталога, оставшегося после падения.
//! 4. Открытие сегментного лога.
//! 5. Восстановление индекса: hint-файл, затем скан data-сегментов с
//!    группировкой по батчам (эффекты батча применяются только при
//!    встрече его finished-маркера).
//! 6. Запуск фоновых потоков: доставка watch-событий, автомерж.

use crossbeam_channel::bounded;
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Options;
use crate::errors::{Error, Result};
use crate::ids::BatchIdGenerator;
use crate::index::BTreeIndex;
use crate::lock::try_acquire_exclusive_lock;
use crate::record::{
    decode_hint_record, decode_log_record, LogRecordType, MERGE_FINISHED_BATCH_ID,
    LOG_RECORD_BATCH_FINISHED, LOG_RECORD_DELETED, LOG_RECORD_NORMAL,
};
use crate::util::now_nanos;
use crate::wal::{LogOptions, Position, SegmentLog};

use super::core::Db;
use super::watch::{self, Watcher};
use super::{load_merge_files, merge_fin_segment_id, DATA_FILE_SUFFIX, HINT_FILE_SUFFIX};

/// Ёмкость канала подписчика watch-событий.
const WATCH_CHANNEL_CAPACITY: usize = 100;

/// Node id генератора батчей: один процесс — один узел.
const BATCH_ID_NODE: u64 = 1;

pub(crate) fn data_log_options(options: &Options) -> LogOptions {
    LogOptions {
        dir_path: options.dir_path.clone(),
        segment_size: options.segment_size,
        segment_file_ext: DATA_FILE_SUFFIX.to_string(),
        sync: options.sync,
        bytes_per_sync: options.bytes_per_sync,
    }
}

/// Hint-файл не ротируется: все записи идут в единственный сегмент.
pub(crate) fn hint_log_options(dir: &Path) -> LogOptions {
    LogOptions {
        dir_path: dir.to_path_buf(),
        segment_size: u64::MAX,
        segment_file_ext: HINT_FILE_SUFFIX.to_string(),
        sync: false,
        bytes_per_sync: 0,
    }
}

impl Db {
    /// Открыть движок. Возвращает Arc, чтобы фоновые задачи могли держать
    /// Weak-ссылку; экземпляр не переоткрывается после close().
    pub fn open(options: Options) -> Result<Arc<Db>> {
        options.validate()?;
        std::fs::create_dir_all(&options.dir_path)?;

        let file_lock = try_acquire_exclusive_lock(&options.dir_path)?;

        // усвоить завершённый merge, прерванный до подмены сегментов
        load_merge_files(&options.dir_path)?;

        let data_files = SegmentLog::open(data_log_options(&options))?;

        let (watcher, watch_rx) = if options.watch_queue_size > 0 {
            // ring of capacity N retains N-1 events; 2 is the useful minimum
            let watcher = Arc::new(Watcher::new((options.watch_queue_size as usize).max(2)));
            let (tx, rx) = bounded(WATCH_CHANNEL_CAPACITY);
            (Some((watcher, tx)), Some(rx))
        } else {
            (None, None)
        };

        let db = Db {
            options,
            data_files: RwLock::new(data_files),
            index: BTreeIndex::new(),
            mu: RwLock::new(()),
            closed: AtomicBool::new(false),
            merge_running: AtomicBool::new(false),
            batch_ids: BatchIdGenerator::new(BATCH_ID_NODE),
            watcher: watcher.as_ref().map(|(w, _)| w.clone()),
            watch_rx,
            expired_cursor: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
            _file_lock: file_lock,
        };

        db.load_index()?;

        let db = Arc::new(db);

        if let Some((w, tx)) = watcher {
            let handle = watch::start_delivery(w, tx, db.shutdown.clone());
            db.threads.lock().unwrap().push(handle);
        }
        if let Some(interval) = db.options.auto_merge_interval {
            let handle = start_auto_merge(&db, interval);
            db.threads.lock().unwrap().push(handle);
        }

        info!(
            "database opened at {}: {} keys",
            db.options.dir_path.display(),
            db.index.len()
        );
        Ok(db)
    }

    /// Перестроить индекс: сначала hint-файл (выход merge), затем скан
    /// data-сегментов выше merge-границы.
    pub(crate) fn load_index(&self) -> Result<()> {
        self.load_index_from_hint_file()?;
        self.load_index_from_data_files()
    }

    fn load_index_from_hint_file(&self) -> Result<()> {
        let hint = SegmentLog::open(hint_log_options(&self.options.dir_path))?;
        let mut reader = hint.reader();
        while let Some(item) = reader.next() {
            let (chunk, _) = match item {
                Ok(v) => v,
                Err(Error::Corrupted(msg)) => {
                    warn!("stopping hint replay at corrupted record: {}", msg);
                    break;
                }
                Err(e) => return Err(e),
            };
            // hint records are merge output and valid by construction
            let (key, position) = decode_hint_record(&chunk);
            self.index.put(key, position);
        }
        Ok(())
    }

    fn load_index_from_data_files(&self) -> Result<()> {
        let boundary = merge_fin_segment_id(&self.options.dir_path)?;
        let now = now_nanos();
        // эффекты батча откладываются до его finished-маркера
        let mut pending: HashMap<u64, Vec<(Vec<u8>, LogRecordType, Position)>> = HashMap::new();

        let data = self.data_files.read().unwrap();
        let mut reader = data.reader();
        loop {
            // сегменты не выше границы уже покрыты hint-файлом
            match reader.current_segment_id() {
                None => break,
                Some(id) if id <= boundary => {
                    reader.skip_current_segment();
                    continue;
                }
                Some(_) => {}
            }
            let (chunk, position) = match reader.next() {
                None => break,
                Some(Ok(item)) => item,
                Some(Err(Error::Corrupted(msg))) => {
                    warn!("stopping index rebuild at torn log tail: {}", msg);
                    break;
                }
                Some(Err(e)) => return Err(e),
            };
            let record = decode_log_record(&chunk);
            match record.rec_type {
                LOG_RECORD_BATCH_FINISHED => {
                    let batch_id = u64::from_be_bytes(
                        record.key[..8].try_into().expect("batch id key must be 8 bytes"),
                    );
                    for (key, rec_type, pos) in pending.remove(&batch_id).unwrap_or_default() {
                        match rec_type {
                            LOG_RECORD_NORMAL => {
                                self.index.put(key, pos);
                            }
                            LOG_RECORD_DELETED => {
                                self.index.delete(&key);
                            }
                            _ => {}
                        }
                    }
                }
                LOG_RECORD_NORMAL if record.batch_id == MERGE_FINISHED_BATCH_ID => {
                    // merge output belongs to no in-flight batch
                    self.index.put(record.key, position);
                }
                _ => {
                    if record.is_expired(now) {
                        self.index.delete(&record.key);
                        continue;
                    }
                    pending
                        .entry(record.batch_id)
                        .or_default()
                        .push((record.key, record.rec_type, position));
                }
            }
        }
        Ok(())
    }
}

fn start_auto_merge(db: &Arc<Db>, interval: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(db);
    let shutdown = db.shutdown.clone();
    std::thread::Builder::new()
        .name("kestrel-automerge".to_string())
        .spawn(move || {
            let mut next_run = Instant::now() + interval;
            loop {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                if Instant::now() >= next_run {
                    let Some(db) = weak.upgrade() else { return };
                    match db.merge(true) {
                        Ok(()) => info!("auto merge pass finished"),
                        Err(Error::DBClosed) => return,
                        Err(Error::MergeRunning) => {}
                        Err(e) => warn!("auto merge pass failed: {}", e),
                    }
                    next_run = Instant::now() + interval;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("failed to spawn auto merge thread")
}
