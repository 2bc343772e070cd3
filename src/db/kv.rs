//! db/kv — одиночные операции и сканы поверх Db.
//!
//! Каждая одиночная операция — одноразовый внутренний батч: одна мутация
//! overlay (или чтение) и commit. Сканы идут по индексу под shared-гардом,
//! значения перечитываются из лога; протухшие записи пропускаются.

use std::time::{Duration, Instant};

use crate::config::BatchOptions;
use crate::errors::{Error, Result};
use crate::metrics::record_expired_key_removed;
use crate::record::{decode_log_record, LOG_RECORD_DELETED};
use crate::util::now_nanos;
use crate::wal::Position;

use super::core::Db;

/// Размер порции ключей, проверяемых sweep'ом за один заход по индексу.
const EXPIRED_SWEEP_CHUNK: usize = 100;

impl Db {
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = self.new_batch(BatchOptions {
            sync: false,
            read_only: false,
        });
        if let Err(e) = batch.put(key, value) {
            let _ = batch.rollback();
            return Err(e);
        }
        batch.commit()
    }

    pub fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()> {
        let mut batch = self.new_batch(BatchOptions {
            sync: false,
            read_only: false,
        });
        if let Err(e) = batch.put_with_ttl(key, value, ttl) {
            let _ = batch.rollback();
            return Err(e);
        }
        batch.commit()
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut batch = self.new_batch(BatchOptions::read_only());
        let res = batch.get(key);
        batch.commit()?;
        res
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = self.new_batch(BatchOptions {
            sync: false,
            read_only: false,
        });
        if let Err(e) = batch.delete(key) {
            let _ = batch.rollback();
            return Err(e);
        }
        batch.commit()
    }

    pub fn exist(&self, key: &[u8]) -> Result<bool> {
        let mut batch = self.new_batch(BatchOptions::read_only());
        let res = batch.exist(key);
        batch.commit()?;
        res
    }

    pub fn expire(&self, key: &[u8], ttl: Duration) -> Result<()> {
        let mut batch = self.new_batch(BatchOptions {
            sync: false,
            read_only: false,
        });
        if let Err(e) = batch.expire(key, ttl) {
            let _ = batch.rollback();
            return Err(e);
        }
        batch.commit()
    }

    pub fn ttl(&self, key: &[u8]) -> Result<Option<Duration>> {
        let mut batch = self.new_batch(BatchOptions::read_only());
        let res = batch.ttl(key);
        batch.commit()?;
        res
    }

    pub fn persist(&self, key: &[u8]) -> Result<()> {
        let mut batch = self.new_batch(BatchOptions {
            sync: false,
            read_only: false,
        });
        if let Err(e) = batch.persist(key) {
            let _ = batch.rollback();
            return Err(e);
        }
        batch.commit()
    }

    // ----------------- сканы -----------------

    /// Обход живых пар по возрастанию ключей. Колбэк: Ok(false) — стоп.
    pub fn ascend<F>(&self, mut handle: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let _guard = self.mu.read().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        let now = now_nanos();
        let data_files = self.data_files.read().unwrap();
        self.index.ascend(|key, position| {
            let chunk = data_files.read(position)?;
            let record = decode_log_record(&chunk);
            if record.rec_type != LOG_RECORD_DELETED && !record.is_expired(now) {
                handle(key, &record.value)
            } else {
                Ok(true)
            }
        })
    }

    /// Обход живых пар в диапазоне [start, end) по возрастанию.
    pub fn ascend_range<F>(&self, start: &[u8], end: &[u8], mut handle: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let _guard = self.mu.read().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        let now = now_nanos();
        let data_files = self.data_files.read().unwrap();
        self.index.ascend_range(start, end, |key, position| {
            let chunk = data_files.read(position)?;
            let record = decode_log_record(&chunk);
            if record.rec_type != LOG_RECORD_DELETED && !record.is_expired(now) {
                handle(key, &record.value)
            } else {
                Ok(true)
            }
        })
    }

    /// Обход живых пар по убыванию ключей.
    pub fn descend<F>(&self, mut handle: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let _guard = self.mu.read().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        let now = now_nanos();
        let data_files = self.data_files.read().unwrap();
        self.index.descend(|key, position| {
            let chunk = data_files.read(position)?;
            let record = decode_log_record(&chunk);
            if record.rec_type != LOG_RECORD_DELETED && !record.is_expired(now) {
                handle(key, &record.value)
            } else {
                Ok(true)
            }
        })
    }

    /// Обход живых пар (end, start] по убыванию.
    pub fn descend_range<F>(&self, start: &[u8], end: &[u8], mut handle: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let _guard = self.mu.read().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        let now = now_nanos();
        let data_files = self.data_files.read().unwrap();
        self.index.descend_range(start, end, |key, position| {
            let chunk = data_files.read(position)?;
            let record = decode_log_record(&chunk);
            if record.rec_type != LOG_RECORD_DELETED && !record.is_expired(now) {
                handle(key, &record.value)
            } else {
                Ok(true)
            }
        })
    }

    /// Обход ключей по возрастанию, опционально по префиксу. При
    /// `filter_expired` значение перечитывается из лога и протухшие ключи
    /// пропускаются; иначе лог не трогается вовсе.
    pub fn ascend_keys<F>(&self, prefix: Option<&[u8]>, filter_expired: bool, handle: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        self.keys_scan(prefix, filter_expired, handle, false)
    }

    /// Обход ключей по убыванию, опционально по префиксу.
    pub fn descend_keys<F>(
        &self,
        prefix: Option<&[u8]>,
        filter_expired: bool,
        handle: F,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        self.keys_scan(prefix, filter_expired, handle, true)
    }

    fn keys_scan<F>(
        &self,
        prefix: Option<&[u8]>,
        filter_expired: bool,
        mut handle: F,
        reverse: bool,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let _guard = self.mu.read().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        let now = now_nanos();
        let data_files = self.data_files.read().unwrap();
        let mut visit = |key: &[u8], position: &Position| -> Result<bool> {
            if let Some(p) = prefix {
                if !key.starts_with(p) {
                    return Ok(true);
                }
            }
            if filter_expired {
                let chunk = data_files.read(position)?;
                let record = decode_log_record(&chunk);
                if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
                    return Ok(true);
                }
            }
            handle(key)
        };
        if reverse {
            self.index.descend(&mut visit)
        } else {
            self.index.ascend(&mut visit)
        }
    }

    // ----------------- sweep просроченных ключей -----------------

    /// Инкрементально вычистить протухшие ключи из индекса порциями по 100,
    /// пока индекс не кончится или не истечёт `timeout`. Курсор сохраняется
    /// между вызовами, так что следующий вызов продолжит с места остановки.
    pub fn delete_expired_keys(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let _guard = self.mu.write().unwrap();
        if self.is_closed() {
            return Err(Error::DBClosed);
        }
        let now = now_nanos();

        loop {
            let cursor = self.expired_cursor.lock().unwrap().clone();
            let mut positions: Vec<Position> = Vec::with_capacity(EXPIRED_SWEEP_CHUNK);
            match &cursor {
                Some(c) => self.index.ascend_greater_or_equal(c, |_key, pos| {
                    positions.push(*pos);
                    Ok(positions.len() < EXPIRED_SWEEP_CHUNK)
                })?,
                None => self.index.ascend(|_key, pos| {
                    positions.push(*pos);
                    Ok(positions.len() < EXPIRED_SWEEP_CHUNK)
                })?,
            }

            if positions.is_empty() {
                // индекс пройден целиком; следующий вызов начнёт сначала
                *self.expired_cursor.lock().unwrap() = None;
                return Ok(());
            }

            let data_files = self.data_files.read().unwrap();
            for position in &positions {
                let chunk = data_files.read(position)?;
                let record = decode_log_record(&chunk);
                if record.is_expired(now) && self.index.delete(&record.key).is_some() {
                    record_expired_key_removed();
                }
                // курсор — строго за обработанным ключом, чтобы обход
                // гарантированно продвигался
                let mut next = record.key;
                next.push(0);
                *self.expired_cursor.lock().unwrap() = Some(next);
            }

            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }
}
