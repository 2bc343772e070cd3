//! Lightweight global metrics for KestrelDB.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Segment log (appends/bytes/fsync/rotations)
//! - Merge/compaction
//! - Watch queue
//! - TTL (lazy expiry + sweep)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Segment log -----
static LOG_APPENDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static LOG_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static LOG_FSYNC_CALLS: AtomicU64 = AtomicU64::new(0);
static LOG_ROTATIONS: AtomicU64 = AtomicU64::new(0);

// ----- Merge -----
static MERGES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static MERGE_RECORDS_REWRITTEN: AtomicU64 = AtomicU64::new(0);

// ----- Watch -----
static WATCH_EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0);

// ----- TTL -----
static EXPIRED_KEYS_REMOVED: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn record_log_append(bytes: usize) {
    LOG_APPENDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    LOG_BYTES_WRITTEN.fetch_add(bytes as u64, Ordering::Relaxed);
}

#[inline]
pub fn record_log_fsync() {
    LOG_FSYNC_CALLS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_log_rotation() {
    LOG_ROTATIONS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_merge_completed() {
    MERGES_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_merge_record_rewritten() {
    MERGE_RECORDS_REWRITTEN.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_watch_event_dropped() {
    WATCH_EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_expired_key_removed() {
    EXPIRED_KEYS_REMOVED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub log_appends_total: u64,
    pub log_bytes_written: u64,
    pub log_fsync_calls: u64,
    pub log_rotations: u64,

    pub merges_completed: u64,
    pub merge_records_rewritten: u64,

    pub watch_events_dropped: u64,

    pub expired_keys_removed: u64,
}

/// Снимок всех счётчиков (Relaxed: значения согласованы лишь приблизительно).
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        log_appends_total: LOG_APPENDS_TOTAL.load(Ordering::Relaxed),
        log_bytes_written: LOG_BYTES_WRITTEN.load(Ordering::Relaxed),
        log_fsync_calls: LOG_FSYNC_CALLS.load(Ordering::Relaxed),
        log_rotations: LOG_ROTATIONS.load(Ordering::Relaxed),
        merges_completed: MERGES_COMPLETED.load(Ordering::Relaxed),
        merge_records_rewritten: MERGE_RECORDS_REWRITTEN.load(Ordering::Relaxed),
        watch_events_dropped: WATCH_EVENTS_DROPPED.load(Ordering::Relaxed),
        expired_keys_removed: EXPIRED_KEYS_REMOVED.load(Ordering::Relaxed),
    }
}
