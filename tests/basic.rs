use anyhow::Result;
use std::path::PathBuf;

use KestrelDB::{Db, Error, Options};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("kdb-{}-{}-{}", prefix, pid, t))
}

#[test]
fn put_get_delete_roundtrip() -> Result<()> {
    let root = unique_root("basic");
    let db = Db::open(Options::default().with_dir_path(&root))?;

    assert!(matches!(db.get(b"missing"), Err(Error::KeyNotFound)));

    db.put(b"alpha", b"one")?;
    assert_eq!(db.get(b"alpha")?, b"one");
    assert!(db.exist(b"alpha")?);

    db.put(b"alpha", b"two")?;
    assert_eq!(db.get(b"alpha")?, b"two");

    db.delete(b"alpha")?;
    assert!(matches!(db.get(b"alpha"), Err(Error::KeyNotFound)));
    assert!(!db.exist(b"alpha")?);

    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn empty_key_is_rejected() -> Result<()> {
    let root = unique_root("emptykey");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    assert!(matches!(db.put(b"", b"v"), Err(Error::KeyIsEmpty)));
    assert!(matches!(db.get(b""), Err(Error::KeyIsEmpty)));
    assert!(matches!(db.delete(b""), Err(Error::KeyIsEmpty)));
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn reopen_preserves_committed_data() -> Result<()> {
    let root = unique_root("reopen");
    {
        let db = Db::open(Options::default().with_dir_path(&root))?;
        for i in 0..100u32 {
            db.put(format!("key-{:03}", i).as_bytes(), format!("val-{}", i).as_bytes())?;
        }
        db.delete(b"key-050")?;
        db.close()?;
    }
    let db = Db::open(Options::default().with_dir_path(&root))?;
    assert_eq!(db.get(b"key-000")?, b"val-0");
    assert_eq!(db.get(b"key-099")?, b"val-99");
    assert!(matches!(db.get(b"key-050"), Err(Error::KeyNotFound)));
    assert_eq!(db.stat()?.keys_num, 99);
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn second_instance_is_locked_out() -> Result<()> {
    let root = unique_root("lock");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    assert!(matches!(
        Db::open(Options::default().with_dir_path(&root)),
        Err(Error::DatabaseIsUsing)
    ));
    db.close()?;
    drop(db); // releases the file lock
    let db2 = Db::open(Options::default().with_dir_path(&root))?;
    db2.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn operations_after_close_fail() -> Result<()> {
    let root = unique_root("closed");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    db.put(b"k", b"v")?;
    db.close()?;
    // close is idempotent
    db.close()?;
    assert!(matches!(db.put(b"k2", b"v"), Err(Error::DBClosed)));
    assert!(matches!(db.get(b"k"), Err(Error::DBClosed)));
    assert!(matches!(db.sync(), Err(Error::DBClosed)));
    assert!(matches!(db.stat(), Err(Error::DBClosed)));
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn stat_counts_keys_and_disk() -> Result<()> {
    let root = unique_root("stat");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    for i in 0..10u8 {
        db.put(&[i], &[i; 32])?;
    }
    db.sync()?;
    let stat = db.stat()?;
    assert_eq!(stat.keys_num, 10);
    assert!(stat.disk_size > 0);
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn watch_disabled_by_default() -> Result<()> {
    let root = unique_root("nowatch");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    assert!(matches!(db.watch(), Err(Error::WatchDisabled)));
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}
