//! SegmentLog: набор нумерованных сегментов одного суффикса.
//!
//! Путь записи:
//! - append() — одна запись сразу в активный сегмент (ротация при
//!   переполнении);
//! - pending_write() + write_all() — батч: все записи попадают в один
//!   сегмент, позиции возвращаются одним набором.
//!
//! Синхронизация: движок сериализует коммиты своей блокировкой; здесь
//! append-путь дополнительно защищён внутренним мьютексом, как того требует
//! контракт лога.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::{Error, Result};
use crate::metrics::{record_log_append, record_log_fsync, record_log_rotation};

use super::{LogReader, Position, Segment, SegmentId, FIRST_SEGMENT_ID};

#[derive(Clone, Debug)]
pub struct LogOptions {
    pub dir_path: PathBuf,
    /// Maximum segment size; the active segment rotates when the next write
    /// would not fit. A single record larger than this still lands in one
    /// (oversized) segment of its own.
    pub segment_size: u64,
    /// Segment file suffix, e.g. ".SEG".
    pub segment_file_ext: String,
    /// Fsync after every append/write_all.
    pub sync: bool,
    /// Fsync once this many bytes have been appended (0 disables).
    pub bytes_per_sync: u64,
}

pub struct SegmentLog {
    opts: LogOptions,
    inner: Mutex<LogInner>,
    pending: Mutex<Vec<Vec<u8>>>,
    bytes_since_sync: AtomicU64,
}

struct LogInner {
    segments: BTreeMap<SegmentId, Arc<Segment>>,
    active_id: SegmentId,
}

impl SegmentLog {
    /// Открыть все сегменты каталога с данным суффиксом; при их отсутствии
    /// создаётся пустой сегмент 1.
    pub fn open(opts: LogOptions) -> Result<SegmentLog> {
        std::fs::create_dir_all(&opts.dir_path)?;
        let mut segments = BTreeMap::new();
        for entry in std::fs::read_dir(&opts.dir_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(opts.segment_file_ext.as_str()) {
                if let Ok(id) = stem.parse::<SegmentId>() {
                    let seg = Segment::open(&opts.dir_path, &opts.segment_file_ext, id)?;
                    segments.insert(id, Arc::new(seg));
                }
            }
        }
        let active_id = match segments.keys().next_back() {
            Some(&id) => id,
            None => {
                let seg = Segment::open(&opts.dir_path, &opts.segment_file_ext, FIRST_SEGMENT_ID)?;
                segments.insert(FIRST_SEGMENT_ID, Arc::new(seg));
                FIRST_SEGMENT_ID
            }
        };
        Ok(SegmentLog {
            opts,
            inner: Mutex::new(LogInner {
                segments,
                active_id,
            }),
            pending: Mutex::new(Vec::new()),
            bytes_since_sync: AtomicU64::new(0),
        })
    }

    pub fn active_segment_id(&self) -> SegmentId {
        self.inner.lock().unwrap().active_id
    }

    /// Нет ни одного байта данных ни в одном сегменте.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.segments.values().all(|s| s.size() == 0)
    }

    /// Сумма размеров всех сегментов.
    pub fn size(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.segments.values().map(|s| s.size()).sum()
    }

    /// Дописать одну запись в активный сегмент.
    pub fn append(&self, data: &[u8]) -> Result<Position> {
        let mut inner = self.inner.lock().unwrap();
        self.rotate_if_needed(&mut inner, data.len())?;
        let active = inner.segments[&inner.active_id].clone();
        drop(inner);
        let pos = active.append(data)?;
        record_log_append(pos.chunk_size as usize);
        self.after_write(pos.chunk_size as u64, &active)?;
        Ok(pos)
    }

    /// Добавить запись в pending-буфер; на диск она попадёт при write_all.
    pub fn pending_write(&self, data: &[u8]) {
        self.pending.lock().unwrap().push(data.to_vec());
    }

    /// Атомарно записать все pending-записи в один сегмент и вернуть по
    /// позиции на каждую. Буфер очищается и при успехе, и при ошибке.
    pub fn write_all(&self) -> Result<Vec<Position>> {
        let batch: Vec<Vec<u8>> = std::mem::take(&mut *self.pending.lock().unwrap());
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.inner.lock().unwrap();
        let total: usize = batch.iter().map(|b| b.len()).sum();
        self.rotate_if_needed(&mut inner, total)?;
        let active = inner.segments[&inner.active_id].clone();
        drop(inner);

        let mut positions = Vec::with_capacity(batch.len());
        let mut bytes = 0u64;
        for data in &batch {
            let pos = active.append(data)?;
            record_log_append(pos.chunk_size as usize);
            bytes += pos.chunk_size as u64;
            positions.push(pos);
        }
        self.after_write(bytes, &active)?;
        Ok(positions)
    }

    /// Открыть новый активный сегмент; прежний становится неизменяемым.
    pub fn rotate(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.rotate_locked(&mut inner)
    }

    pub fn sync(&self) -> Result<()> {
        let active = {
            let inner = self.inner.lock().unwrap();
            inner.segments[&inner.active_id].clone()
        };
        active.sync()?;
        record_log_fsync();
        self.bytes_since_sync.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Прочитать запись по позиции.
    pub fn read(&self, pos: &Position) -> Result<Vec<u8>> {
        let segment = {
            let inner = self.inner.lock().unwrap();
            inner.segments.get(&pos.segment_id).cloned()
        };
        match segment {
            Some(seg) => seg.read(pos),
            None => Err(Error::Corrupted("record position in unknown segment")),
        }
    }

    /// Последовательный reader по всем сегментам.
    pub fn reader(&self) -> LogReader {
        self.reader_with_max(SegmentId::MAX)
    }

    /// Последовательный reader по сегментам с id не выше `max`.
    pub fn reader_with_max(&self, max: SegmentId) -> LogReader {
        let inner = self.inner.lock().unwrap();
        let files: Vec<(SegmentId, PathBuf)> = inner
            .segments
            .iter()
            .filter(|(&id, _)| id <= max)
            .map(|(&id, seg)| (id, seg.path().to_path_buf()))
            .collect();
        LogReader::new(files)
    }

    fn rotate_if_needed(&self, inner: &mut LogInner, data_len: usize) -> Result<()> {
        let active = &inner.segments[&inner.active_id];
        if active.size() > 0 && active.size() + active.encoded_len(data_len) > self.opts.segment_size
        {
            self.rotate_locked(inner)?;
        }
        Ok(())
    }

    fn rotate_locked(&self, inner: &mut LogInner) -> Result<()> {
        let active = inner.segments[&inner.active_id].clone();
        active.sync()?;
        let next_id = inner.active_id + 1;
        let seg = Segment::open(&self.opts.dir_path, &self.opts.segment_file_ext, next_id)?;
        inner.segments.insert(next_id, Arc::new(seg));
        inner.active_id = next_id;
        record_log_rotation();
        Ok(())
    }

    fn after_write(&self, bytes: u64, active: &Segment) -> Result<()> {
        if self.opts.sync {
            active.sync()?;
            record_log_fsync();
            self.bytes_since_sync.store(0, Ordering::Relaxed);
            return Ok(());
        }
        if self.opts.bytes_per_sync > 0 {
            let total = self.bytes_since_sync.fetch_add(bytes, Ordering::Relaxed) + bytes;
            if total >= self.opts.bytes_per_sync {
                active.sync()?;
                record_log_fsync();
                self.bytes_since_sync.store(0, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}
