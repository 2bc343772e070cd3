use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

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
fn value_with_ttl_is_visible_until_expiry() -> Result<()> {
    let root = unique_root("ttl-live");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    db.put_with_ttl(b"k", b"v", Duration::from_secs(60))?;
    assert_eq!(db.get(b"k")?, b"v");
    let remaining = db.ttl(b"k")?.expect("key must carry a ttl");
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(50));
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn zero_ttl_means_already_expired_not_forever() -> Result<()> {
    let root = unique_root("ttl-zero");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    db.put_with_ttl(b"k", b"v", Duration::from_secs(0))?;
    std::thread::sleep(Duration::from_millis(5));
    assert!(matches!(db.get(b"k"), Err(Error::KeyNotFound)));
    assert!(!db.exist(b"k")?);
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn expired_key_is_lazily_removed_from_the_index() -> Result<()> {
    let root = unique_root("ttl-lazy");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    db.put_with_ttl(b"gone", b"v", Duration::from_millis(20))?;
    db.put(b"stay", b"v")?;
    assert_eq!(db.stat()?.keys_num, 2);

    std::thread::sleep(Duration::from_millis(40));
    assert!(!db.exist(b"gone")?);
    // самоизлечение: протухший ключ вычищен при чтении
    assert_eq!(db.stat()?.keys_num, 1);
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn expire_sets_a_new_deadline() -> Result<()> {
    let root = unique_root("ttl-expire");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    db.put(b"k", b"v")?;
    assert_eq!(db.ttl(b"k")?, None);

    db.expire(b"k", Duration::from_millis(30))?;
    assert!(db.ttl(b"k")?.is_some());
    std::thread::sleep(Duration::from_millis(60));
    assert!(matches!(db.get(b"k"), Err(Error::KeyNotFound)));

    assert!(matches!(
        db.expire(b"missing", Duration::from_secs(1)),
        Err(Error::KeyNotFound)
    ));
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn persist_clears_the_deadline() -> Result<()> {
    let root = unique_root("ttl-persist");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    db.put_with_ttl(b"k", b"v", Duration::from_secs(30))?;
    assert!(db.ttl(b"k")?.is_some());

    db.persist(b"k")?;
    assert_eq!(db.ttl(b"k")?, None);
    assert_eq!(db.get(b"k")?, b"v");

    // persist ключа без TTL — мгновенный no-op
    db.persist(b"k")?;
    assert!(matches!(db.persist(b"missing"), Err(Error::KeyNotFound)));
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn ttl_survives_reopen() -> Result<()> {
    let root = unique_root("ttl-reopen");
    {
        let db = Db::open(Options::default().with_dir_path(&root))?;
        db.put_with_ttl(b"short", b"v", Duration::from_millis(20))?;
        db.put_with_ttl(b"long", b"v", Duration::from_secs(120))?;
        db.close()?;
    }
    std::thread::sleep(Duration::from_millis(40));
    let db = Db::open(Options::default().with_dir_path(&root))?;
    assert!(matches!(db.get(b"short"), Err(Error::KeyNotFound)));
    assert_eq!(db.get(b"long")?, b"v");
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn sweep_removes_expired_keys_and_keeps_live_ones() -> Result<()> {
    let root = unique_root("ttl-sweep");
    let db = Db::open(Options::default().with_dir_path(&root))?;
    for i in 0..200u32 {
        let key = format!("key-{:04}", i);
        if i % 2 == 0 {
            db.put_with_ttl(key.as_bytes(), b"v", Duration::from_millis(10))?;
        } else {
            db.put(key.as_bytes(), b"v")?;
        }
    }
    std::thread::sleep(Duration::from_millis(30));

    db.delete_expired_keys(Duration::from_secs(5))?;
    assert_eq!(db.stat()?.keys_num, 100);
    for i in 0..200u32 {
        let key = format!("key-{:04}", i);
        assert_eq!(db.exist(key.as_bytes())?, i % 2 == 1);
    }
    db.close()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}
