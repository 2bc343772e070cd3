//! db/merge — компактация ("merge") лога.
//!
//! Протокол:
//! 1. Под общей блокировкой: проверки closed/empty/running, фиксация
//!    границы ротации и открытие нового активного сегмента. Это
//!    единственный эксклюзивный участок — дальше проход идёт по
//!    замороженным сегментам без блокировки.
//! 2. Живые записи (Normal, не протухшие, позиция совпадает с индексом)
//!    переписываются в scratch-каталог `<dir>-merge` с batch id = 0;
//!    параллельно пишется hint-запись на каждую.
//! 3. Finished-маркер с id граничного сегмента — единственное durable
//!    доказательство завершённого прохода; без него каталог при следующем
//!    открытии/merge просто удаляется.
//! 4. При reopen_after_done сегменты не выше границы подменяются выходом
//!    merge, индекс перестраивается заново.

use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{Error, Result};
use crate::metrics::{record_merge_completed, record_merge_record_rewritten};
use crate::record::{
    decode_log_record, encode_hint_record, encode_log_record, encode_merge_fin_record,
    LOG_RECORD_NORMAL, MERGE_FINISHED_BATCH_ID,
};
use crate::util::now_nanos;
use crate::wal::{
    segment_file_name, LogOptions, SegmentId, SegmentLog, CHUNK_HEADER_SIZE, FIRST_SEGMENT_ID,
};

use super::core::Db;
use super::open::{data_log_options, hint_log_options};
use super::{DATA_FILE_SUFFIX, HINT_FILE_SUFFIX, MERGE_FIN_SUFFIX};

const MERGE_DIR_SUFFIX: &str = "-merge";

/// Сбрасывает merge-флаг на любом пути выхода, чтобы сорвавшийся проход не
/// заклинил последующие.
struct MergeRunningGuard<'a>(&'a AtomicBool);

impl Drop for MergeRunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Db {
    /// Переписать все сегменты ниже границы ротации, отфильтровав мёртвые
    /// записи. При `reopen_after_done` выход merge сразу подменяет исходные
    /// сегменты и индекс перестраивается.
    ///
    /// Merge большого лога — долгая операция; запускайте её на простое.
    pub fn merge(&self, reopen_after_done: bool) -> Result<()> {
        self.do_merge()?;
        if !reopen_after_done {
            return Ok(());
        }

        let _guard = self.mu.write().unwrap();

        {
            let mut data_files = self.data_files.write().unwrap();
            load_merge_files(&self.options.dir_path)?;
            // прежний лог закрывается при подмене значения
            *data_files = SegmentLog::open(data_log_options(&self.options))?;
        }

        self.index.clear();
        self.load_index()?;
        Ok(())
    }

    fn do_merge(&self) -> Result<()> {
        let prev_active;
        let _running;
        {
            let _guard = self.mu.write().unwrap();
            if self.is_closed() {
                return Err(Error::DBClosed);
            }
            if self.data_files.read().unwrap().is_empty() {
                return Ok(());
            }
            if self
                .merge_running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(Error::MergeRunning);
            }
            _running = MergeRunningGuard(&self.merge_running);

            let data_files = self.data_files.read().unwrap();
            prev_active = data_files.active_segment_id();
            // после ротации все новые записи идут в новый сегмент; проход
            // ниже читает только замороженный диапазон
            data_files.rotate()?;
        }

        let merge_path = merge_dir_path(&self.options.dir_path);
        if merge_path.exists() {
            std::fs::remove_dir_all(&merge_path)?;
        }
        // durability восстанавливается финальным sync'ом, поэтому
        // scratch-лог пишется без fsync на каждую запись
        let scratch = SegmentLog::open(LogOptions {
            dir_path: merge_path.clone(),
            segment_size: self.options.segment_size,
            segment_file_ext: DATA_FILE_SUFFIX.to_string(),
            sync: false,
            bytes_per_sync: 0,
        })?;
        let hint = SegmentLog::open(hint_log_options(&merge_path))?;

        let mut reader = self.data_files.read().unwrap().reader_with_max(prev_active);
        let now = now_nanos();
        let mut buf = Vec::new();
        let mut rewritten = 0u64;
        while let Some(item) = reader.next() {
            let (chunk, position) = match item {
                Ok(v) => v,
                Err(Error::Corrupted(msg)) => {
                    warn!("stopping merge pass at corrupted record: {}", msg);
                    break;
                }
                Err(e) => return Err(e),
            };
            let mut record = decode_log_record(&chunk);
            // tombstone'ы и finished-маркеры мертвы по определению
            if record.rec_type != LOG_RECORD_NORMAL || record.is_expired(now) {
                continue;
            }
            let index_pos = {
                let _rg = self.mu.read().unwrap();
                self.index.get(&record.key)
            };
            let Some(index_pos) = index_pos else { continue };
            if !index_pos.same_location(&position) {
                // значение уже вытеснено более новой записью
                continue;
            }
            record.batch_id = MERGE_FINISHED_BATCH_ID;
            encode_log_record(&record, &mut buf);
            let new_pos = scratch.append(&buf)?;
            encode_hint_record(&record.key, &new_pos, &mut buf);
            hint.append(&buf)?;
            record_merge_record_rewritten();
            rewritten += 1;
        }

        scratch.sync()?;
        hint.sync()?;

        // единственное durable-доказательство завершённого прохода
        let fin = SegmentLog::open(LogOptions {
            dir_path: merge_path.clone(),
            segment_size: u64::MAX,
            segment_file_ext: MERGE_FIN_SUFFIX.to_string(),
            sync: false,
            bytes_per_sync: 0,
        })?;
        fin.append(&encode_merge_fin_record(prev_active))?;
        fin.sync()?;

        record_merge_completed();
        info!(
            "merge pass finished: boundary segment {}, {} live records rewritten",
            prev_active, rewritten
        );
        Ok(())
    }
}

fn merge_dir_path(dir: &Path) -> PathBuf {
    let base = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.with_file_name(format!("{}{}", base, MERGE_DIR_SUFFIX))
}

/// Усвоить выход завершённого merge: подменить сегменты не выше границы,
/// перенести hint и finished-маркер. Каталог merge удаляется в любом случае;
/// без finished-маркера его содержимое игнорируется.
pub(crate) fn load_merge_files(dir: &Path) -> Result<()> {
    let merge_path = merge_dir_path(dir);
    if !merge_path.exists() {
        return Ok(());
    }
    let result = (|| -> Result<()> {
        let fin_id = merge_fin_segment_id(&merge_path)?;
        if fin_id == 0 {
            // прерванный merge: каталог — мусор
            return Ok(());
        }
        for id in FIRST_SEGMENT_ID..=fin_id {
            let dest = segment_file_name(dir, DATA_FILE_SUFFIX, id);
            if dest.exists() {
                std::fs::remove_file(&dest)?;
            }
            move_segment_file(&merge_path, dir, DATA_FILE_SUFFIX, id, false);
        }
        // hint раньше маркера: граница без hint-файла потеряла бы merge-выход
        move_segment_file(&merge_path, dir, HINT_FILE_SUFFIX, FIRST_SEGMENT_ID, true);
        move_segment_file(&merge_path, dir, MERGE_FIN_SUFFIX, FIRST_SEGMENT_ID, true);
        Ok(())
    })();
    let _ = std::fs::remove_dir_all(&merge_path);
    result
}

fn move_segment_file(src_dir: &Path, dest_dir: &Path, suffix: &str, id: SegmentId, force: bool) {
    let src = segment_file_name(src_dir, suffix, id);
    let meta = match std::fs::metadata(&src) {
        Ok(m) => m,
        Err(_) => return,
    };
    if !force && meta.len() == 0 {
        return;
    }
    let dest = segment_file_name(dest_dir, suffix, id);
    let _ = std::fs::rename(&src, &dest);
}

/// Id граничного сегмента из finished-маркера каталога; 0 — маркера нет
/// (merge не завершался или был прерван).
pub(crate) fn merge_fin_segment_id(dir: &Path) -> Result<SegmentId> {
    let path = segment_file_name(dir, MERGE_FIN_SUFFIX, FIRST_SEGMENT_ID);
    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(_) => return Ok(0),
    };
    // полезная нагрузка лежит сразу за 7-байтовым заголовком чанка
    file.seek(SeekFrom::Start(CHUNK_HEADER_SIZE))?;
    let mut buf = [0u8; 4];
    if file.read_exact(&mut buf).is_err() {
        return Ok(0);
    }
    Ok(LittleEndian::read_u32(&buf))
}
