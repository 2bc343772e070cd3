use anyhow::Result;
use std::path::PathBuf;

use KestrelDB::db::DATA_FILE_SUFFIX;
use KestrelDB::record::{
    encode_log_record, LogRecord, LOG_RECORD_DELETED, LOG_RECORD_NORMAL,
};
use KestrelDB::wal::{LogOptions, SegmentLog};
use KestrelDB::{Db, Error, Options};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("kdb-{}-{}-{}", prefix, pid, t))
}

fn raw_log(root: &PathBuf) -> Result<SegmentLog> {
    Ok(SegmentLog::open(LogOptions {
        dir_path: root.clone(),
        segment_size: 1024 * 1024 * 1024,
        segment_file_ext: DATA_FILE_SUFFIX.to_string(),
        sync: false,
        bytes_per_sync: 0,
    })?)
}

#[test]
fn committed_batches_survive_an_unclean_restart() -> Result<()> {
    let root = unique_root("crash-ok");
    {
        let db = Db::open(Options::default().with_dir_path(&root))?;
        for batch_no in 0..10u32 {
            let mut batch = db.new_batch(Default::default());
            for i in 0..20u32 {
                batch.put(
                    format!("b{}-k{}", batch_no, i).as_bytes(),
                    format!("v{}", i).as_bytes(),
                )?;
            }
            batch.commit()?;
        }
        // нет close(): имитация внезапного рестарта
        drop(db);
    }
    let db = Db::open(Options::default().with_dir_path(&root))?;
    assert_eq!(db.stat()?.keys_num, 200);
    assert_eq!(db.get(b"b9-k19")?, b"v19");
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn batch_without_finish_marker_is_invisible() -> Result<()> {
    let root = unique_root("crash-torn");
    {
        let db = Db::open(Options::default().with_dir_path(&root))?;
        db.put(b"committed", b"v")?;
        db.close()?;
    }
    {
        // дописать в лог батч без finished-маркера: так выглядит падение
        // посреди коммита
        let log = raw_log(&root)?;
        let mut buf = Vec::new();
        for i in 0..3u8 {
            let record = LogRecord {
                key: format!("torn-{}", i).into_bytes(),
                value: b"never-visible".to_vec(),
                rec_type: LOG_RECORD_NORMAL,
                batch_id: 0xDEAD_BEEF,
                expire: 0,
            };
            encode_log_record(&record, &mut buf);
            log.append(&buf)?;
        }
        log.sync()?;
    }
    let db = Db::open(Options::default().with_dir_path(&root))?;
    assert_eq!(db.get(b"committed")?, b"v");
    for i in 0..3u8 {
        assert!(matches!(
            db.get(format!("torn-{}", i).as_bytes()),
            Err(Error::KeyNotFound)
        ));
    }
    assert_eq!(db.stat()?.keys_num, 1);
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn unfinished_delete_batch_leaves_the_key_alive() -> Result<()> {
    let root = unique_root("crash-del");
    {
        let db = Db::open(Options::default().with_dir_path(&root))?;
        db.put(b"victim", b"alive")?;
        db.close()?;
    }
    {
        let log = raw_log(&root)?;
        let mut buf = Vec::new();
        let tombstone = LogRecord {
            key: b"victim".to_vec(),
            value: Vec::new(),
            rec_type: LOG_RECORD_DELETED,
            batch_id: 0xBADC_0FFE,
            expire: 0,
        };
        encode_log_record(&tombstone, &mut buf);
        log.append(&buf)?;
        log.sync()?;
    }
    let db = Db::open(Options::default().with_dir_path(&root))?;
    // tombstone без маркера не применяется
    assert_eq!(db.get(b"victim")?, b"alive");
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn torn_tail_bytes_do_not_prevent_recovery() -> Result<()> {
    let root = unique_root("crash-tail");
    {
        let db = Db::open(Options::default().with_dir_path(&root))?;
        for i in 0..50u32 {
            db.put(format!("k-{:02}", i).as_bytes(), b"v")?;
        }
        db.close()?;
    }
    {
        // оборвать последний чанк: так выглядит падение посреди write_all
        let seg = KestrelDB::wal::segment_file_name(&root, DATA_FILE_SUFFIX, 1);
        let raw = std::fs::read(&seg)?;
        std::fs::write(&seg, &raw[..raw.len() - 5])?;
    }
    let db = Db::open(Options::default().with_dir_path(&root))?;
    // последний батч потерян вместе с маркером, остальные — на месте
    assert_eq!(db.stat()?.keys_num, 49);
    assert_eq!(db.get(b"k-00")?, b"v");
    assert!(matches!(db.get(b"k-49"), Err(Error::KeyNotFound)));
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}
