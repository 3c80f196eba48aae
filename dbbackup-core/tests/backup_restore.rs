//! End-to-end backup/restore against a real SQLite database and local
//! storage, exercising the public API the way the CLI does.

use dbbackup_core::retention::prune_by_age;
use dbbackup_core::{
    engine_from_config, storage_from_config, BackupPipeline, Config, GzipCompressor,
    StorageBackend,
};
use rusqlite::Connection;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn config_for(db_path: &Path, backup_dir: &Path, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        (
            "DATABASE_URL".to_string(),
            format!("sqlite:///{}", db_path.display()),
        ),
        (
            "DBBACKUP_DIR".to_string(),
            backup_dir.display().to_string(),
        ),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn seeded_db(dir: &Path) -> PathBuf {
    let db_path = dir.join("test.sqlite3");
    let conn = Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO users (name) VALUES ('alice'), ('bob');",
    )
    .unwrap();
    conn.close().map_err(|(_, e)| e).unwrap();
    db_path
}

#[test]
fn sqlite_backup_to_local_storage_with_compression() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_db(dir.path());
    let backup_dir = dir.path().join("backups");

    let config = config_for(&db_path, &backup_dir, &[]);
    let engine = engine_from_config(&config).unwrap();
    let storage = storage_from_config(&config).unwrap();

    let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);
    let artifact = pipeline.run_backup().unwrap();

    // default-YYYYMMDD-HHMMSS.sqlite3.gz
    assert!(artifact.starts_with("default-"));
    assert!(artifact.ends_with(".sqlite3.gz"));
    assert_eq!(artifact.len(), "default-YYYYMMDD-HHMMSS.sqlite3.gz".len());

    let stored = backup_dir.join(&artifact);
    assert!(stored.exists());

    // Valid gzip wrapping a valid SQLite database.
    let raw = fs::read(&stored).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let copy = dir.path().join(artifact.clone());
    fs::copy(&stored, &copy).unwrap();
    let unpacked = GzipCompressor::new().decompress_file(&copy).unwrap();
    let header = fs::read(&unpacked).unwrap();
    assert!(header.starts_with(b"SQLite format 3\0"));
}

#[test]
fn sqlite_backup_then_restore_roundtrip() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_db(dir.path());
    let backup_dir = dir.path().join("backups");

    let config = config_for(&db_path, &backup_dir, &[]);
    let engine = engine_from_config(&config).unwrap();
    let storage = storage_from_config(&config).unwrap();
    let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);

    let artifact = pipeline.run_backup().unwrap();

    // Damage the live database, then restore the latest backup.
    let conn = Connection::open(&db_path).unwrap();
    conn.execute("DELETE FROM users", []).unwrap();
    drop(conn);

    let restored = pipeline.run_restore(None).unwrap();
    assert_eq!(restored.as_deref(), Some(artifact.as_str()));

    let conn = Connection::open(&db_path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);

    // The stored artifact survives the restore.
    assert!(backup_dir.join(&artifact).exists());
}

#[test]
fn restore_on_empty_store_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_db(dir.path());
    let backup_dir = dir.path().join("backups");

    let config = config_for(&db_path, &backup_dir, &[]);
    let engine = engine_from_config(&config).unwrap();
    let storage = storage_from_config(&config).unwrap();

    assert!(storage.list().unwrap().is_empty());

    let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);
    assert!(pipeline.run_restore(None).unwrap().is_none());
}

#[test]
fn uncompressed_backup_when_disabled() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_db(dir.path());
    let backup_dir = dir.path().join("backups");

    let config = config_for(&db_path, &backup_dir, &[("DBBACKUP_COMPRESS", "false")]);
    let engine = engine_from_config(&config).unwrap();
    let storage = storage_from_config(&config).unwrap();

    let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);
    let artifact = pipeline.run_backup().unwrap();

    assert!(artifact.ends_with(".sqlite3"));
    let header = fs::read(backup_dir.join(&artifact)).unwrap();
    assert!(header.starts_with(b"SQLite format 3\0"));
}

#[test]
fn age_pruning_leaves_recent_backups() {
    let dir = TempDir::new().unwrap();
    let db_path = seeded_db(dir.path());
    let backup_dir = dir.path().join("backups");

    let config = config_for(&db_path, &backup_dir, &[]);
    let storage = storage_from_config(&config).unwrap();

    // Plant an ancient artifact next to a fresh real backup.
    fs::write(backup_dir.join("default-20000101-000000.sqlite3.gz"), b"old").unwrap();

    let engine = engine_from_config(&config).unwrap();
    let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);
    let fresh = pipeline.run_backup().unwrap();

    let deleted = prune_by_age(storage.as_ref(), 7).unwrap();
    assert_eq!(deleted, 1);

    let remaining = storage.list().unwrap();
    assert_eq!(remaining, vec![fresh]);
}
