//! db/batch — атомарная группа мутаций.
//!
//! Batch держит общую блокировку движка весь свой срок жизни: exclusive для
//! пишущего, shared для read-only. Операции работают поверх overlay
//! отложенных записей (последняя запись по ключу побеждает, поиск — обратным
//! линейным сканом) с откатом к индексу и логу.
//!
//! Коммит — двухфазный: (1) все записи плюс finished-маркер уходят в лог
//! одним write_all (durability), (2) эффекты применяются к индексу и
//! рассылаются watch-события. Падение между фазами безопасно: индекс всегда
//! перестраивается из лога, применённые эффекты без durable-записи невозможны.

use std::sync::{RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::config::BatchOptions;
use crate::errors::{Error, Result};
use crate::metrics::record_expired_key_removed;
use crate::record::{
    encode_log_record, decode_log_record, LogRecord, MAX_LOG_RECORD_HEADER_SIZE,
    LOG_RECORD_BATCH_FINISHED, LOG_RECORD_DELETED, LOG_RECORD_NORMAL,
};
use crate::util::now_nanos;

use super::core::Db;
use super::watch::{Event, WatchAction};

enum EngineGuard<'a> {
    #[allow(dead_code)]
    Shared(RwLockReadGuard<'a, ()>),
    #[allow(dead_code)]
    Exclusive(RwLockWriteGuard<'a, ()>),
}

pub struct Batch<'a> {
    db: &'a Db,
    guard: Option<EngineGuard<'a>>,
    pending: Vec<LogRecord>,
    options: BatchOptions,
    committed: bool,
    rolled_back: bool,
}

impl Db {
    /// Создать батч; блокировка движка берётся сразу и держится до
    /// commit/rollback (или Drop батча).
    pub fn new_batch(&self, options: BatchOptions) -> Batch<'_> {
        let guard = if options.read_only {
            EngineGuard::Shared(self.mu.read().unwrap())
        } else {
            EngineGuard::Exclusive(self.mu.write().unwrap())
        };
        Batch {
            db: self,
            guard: Some(guard),
            pending: Vec::new(),
            options,
            committed: false,
            rolled_back: false,
        }
    }
}

impl<'a> Batch<'a> {
    #[inline]
    fn find_pending(&self, key: &[u8]) -> Option<usize> {
        self.pending.iter().rposition(|r| r.key == key)
    }

    fn check_writable(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        if self.db.is_closed() {
            return Err(Error::DBClosed);
        }
        if self.options.read_only {
            return Err(Error::ReadOnlyBatch);
        }
        Ok(())
    }

    fn check_readable(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        if self.db.is_closed() {
            return Err(Error::DBClosed);
        }
        Ok(())
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.upsert(key, value, 0)
    }

    pub fn put_with_ttl(&mut self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()> {
        self.upsert(key, value, expire_at(now_nanos(), ttl))
    }

    fn upsert(&mut self, key: &[u8], value: &[u8], expire: i64) -> Result<()> {
        self.check_writable(key)?;
        // overlay никогда не держит две записи одного ключа
        match self.find_pending(key) {
            Some(i) => {
                let record = &mut self.pending[i];
                record.value = value.to_vec();
                record.rec_type = LOG_RECORD_NORMAL;
                record.expire = expire;
            }
            None => self.pending.push(LogRecord {
                key: key.to_vec(),
                value: value.to_vec(),
                rec_type: LOG_RECORD_NORMAL,
                batch_id: 0,
                expire,
            }),
        }
        Ok(())
    }

    /// Tombstone пишется даже для заведомо отсутствующего ключа: delete не
    /// ходит в индекс на горячем пути, а лишние tombstone'ы вычищает merge.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.check_writable(key)?;
        match self.find_pending(key) {
            Some(i) => {
                let record = &mut self.pending[i];
                record.rec_type = LOG_RECORD_DELETED;
                record.value.clear();
                record.expire = 0;
            }
            None => self.pending.push(LogRecord {
                key: key.to_vec(),
                value: Vec::new(),
                rec_type: LOG_RECORD_DELETED,
                batch_id: 0,
                expire: 0,
            }),
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_readable(key)?;
        let now = now_nanos();

        if let Some(i) = self.find_pending(key) {
            let record = &self.pending[i];
            if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
                return Err(Error::KeyNotFound);
            }
            return Ok(record.value.clone());
        }

        let position = self.db.index.get(key).ok_or(Error::KeyNotFound)?;
        let chunk = self.db.data_files.read().unwrap().read(&position)?;
        let record = decode_log_record(&chunk);
        if record.rec_type == LOG_RECORD_DELETED {
            panic!("deleted data cannot exist in the index");
        }
        if record.is_expired(now) {
            // самоизлечение: протухшая запись убирается из индекса прямо
            // при чтении
            if self.db.index.delete(&record.key).is_some() {
                record_expired_key_removed();
            }
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    pub fn exist(&self, key: &[u8]) -> Result<bool> {
        self.check_readable(key)?;
        let now = now_nanos();

        if let Some(i) = self.find_pending(key) {
            let record = &self.pending[i];
            return Ok(record.rec_type != LOG_RECORD_DELETED && !record.is_expired(now));
        }

        let position = match self.db.index.get(key) {
            Some(p) => p,
            None => return Ok(false),
        };
        let chunk = self.db.data_files.read().unwrap().read(&position)?;
        let record = decode_log_record(&chunk);
        if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
            if self.db.index.delete(&record.key).is_some() && record.is_expired(now) {
                record_expired_key_removed();
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Назначить ключу новый срок жизни. Из overlay срок меняется на месте;
    /// запись из лога перечитывается и попадает в overlay — эффект наступит
    /// при коммите.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> Result<()> {
        self.check_writable(key)?;
        let now = now_nanos();

        if let Some(i) = self.find_pending(key) {
            let record = &mut self.pending[i];
            if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
                return Err(Error::KeyNotFound);
            }
            record.expire = expire_at(now, ttl);
            return Ok(());
        }

        let position = self.db.index.get(key).ok_or(Error::KeyNotFound)?;
        let chunk = self.db.data_files.read().unwrap().read(&position)?;
        let mut record = decode_log_record(&chunk);
        if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
            if self.db.index.delete(key).is_some() && record.is_expired(now) {
                record_expired_key_removed();
            }
            return Err(Error::KeyNotFound);
        }
        record.expire = expire_at(now, ttl);
        self.pending.push(record);
        Ok(())
    }

    /// Остаток срока жизни ключа; None — ключ не истекает.
    pub fn ttl(&self, key: &[u8]) -> Result<Option<Duration>> {
        self.check_readable(key)?;
        let now = now_nanos();

        if let Some(i) = self.find_pending(key) {
            let record = &self.pending[i];
            if record.expire == 0 {
                return Ok(None);
            }
            if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
                return Err(Error::KeyNotFound);
            }
            return Ok(Some(Duration::from_nanos((record.expire - now) as u64)));
        }

        let position = self.db.index.get(key).ok_or(Error::KeyNotFound)?;
        let chunk = self.db.data_files.read().unwrap().read(&position)?;
        let record = decode_log_record(&chunk);
        if record.rec_type == LOG_RECORD_DELETED {
            return Err(Error::KeyNotFound);
        }
        if record.is_expired(now) {
            if self.db.index.delete(key).is_some() {
                record_expired_key_removed();
            }
            return Err(Error::KeyNotFound);
        }
        if record.expire > 0 {
            return Ok(Some(Duration::from_nanos((record.expire - now) as u64)));
        }
        Ok(None)
    }

    /// Снять срок жизни (ключ перестаёт истекать).
    pub fn persist(&mut self, key: &[u8]) -> Result<()> {
        self.check_writable(key)?;
        let now = now_nanos();

        if let Some(i) = self.find_pending(key) {
            let record = &mut self.pending[i];
            if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
                return Err(Error::KeyNotFound);
            }
            record.expire = 0;
            return Ok(());
        }

        let position = self.db.index.get(key).ok_or(Error::KeyNotFound)?;
        let chunk = self.db.data_files.read().unwrap().read(&position)?;
        let mut record = decode_log_record(&chunk);
        if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
            if self.db.index.delete(key).is_some() && record.is_expired(now) {
                record_expired_key_removed();
            }
            return Err(Error::KeyNotFound);
        }
        // ключ и так не истекает — отложенная работа не нужна
        if record.expire == 0 {
            return Ok(());
        }
        record.expire = 0;
        self.pending.push(record);
        Ok(())
    }

    /// Зафиксировать батч. No-op для read-only и пустого батча.
    pub fn commit(&mut self) -> Result<()> {
        let res = self.commit_inner();
        self.guard.take();
        res
    }

    fn commit_inner(&mut self) -> Result<()> {
        if self.db.is_closed() {
            return Err(Error::DBClosed);
        }
        if self.options.read_only || self.pending.is_empty() {
            return Ok(());
        }
        if self.committed {
            return Err(Error::BatchCommitted);
        }
        if self.rolled_back {
            return Err(Error::BatchRolledBack);
        }

        let batch_id = self.db.batch_ids.next_id();
        let now = now_nanos();
        let data_files = self.db.data_files.read().unwrap();

        // фаза 1: все записи + finished-маркер одним write_all
        let mut buf = Vec::with_capacity(MAX_LOG_RECORD_HEADER_SIZE + 64);
        for record in &mut self.pending {
            record.batch_id = batch_id;
            encode_log_record(record, &mut buf);
            data_files.pending_write(&buf);
        }
        let finish = LogRecord {
            key: batch_id.to_be_bytes().to_vec(),
            value: Vec::new(),
            rec_type: LOG_RECORD_BATCH_FINISHED,
            batch_id: 0,
            expire: 0,
        };
        encode_log_record(&finish, &mut buf);
        data_files.pending_write(&buf);

        let positions = data_files.write_all()?;
        if positions.len() != self.pending.len() + 1 {
            panic!("chunk positions length is not equal to pending writes length");
        }

        if self.options.sync && !self.db.options.sync {
            data_files.sync()?;
        }

        // фаза 2: эффекты в индекс + watch-события
        for (i, record) in self.pending.iter().enumerate() {
            if record.rec_type == LOG_RECORD_DELETED || record.is_expired(now) {
                self.db.index.delete(&record.key);
            } else {
                self.db.index.put(record.key.clone(), positions[i]);
            }
            if let Some(watcher) = &self.db.watcher {
                let action = if record.rec_type == LOG_RECORD_DELETED {
                    WatchAction::Delete
                } else {
                    WatchAction::Put
                };
                watcher.put_event(Event {
                    action,
                    key: record.key.clone(),
                    value: record.value.clone(),
                    batch_id,
                });
            }
        }

        self.committed = true;
        Ok(())
    }

    /// Отбросить несохранённый батч.
    pub fn rollback(&mut self) -> Result<()> {
        let res = self.rollback_inner();
        self.guard.take();
        res
    }

    fn rollback_inner(&mut self) -> Result<()> {
        if self.db.is_closed() {
            return Err(Error::DBClosed);
        }
        if self.committed {
            return Err(Error::BatchCommitted);
        }
        if self.rolled_back {
            return Err(Error::BatchRolledBack);
        }
        if !self.options.read_only {
            self.pending.clear();
        }
        self.rolled_back = true;
        Ok(())
    }
}

#[inline]
fn expire_at(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(ttl.as_nanos().min(i64::MAX as u128) as i64)
}
