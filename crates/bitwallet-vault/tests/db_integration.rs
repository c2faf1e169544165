#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for `StoreDb`: file creation, migrations, schema
//! backstops and reopen behaviour.

use bitwallet_vault::db::StoreDb;
use bitwallet_vault::directories::{root_id, Directories, DirectoryFilter, NewDirectory};
use bitwallet_vault::{Repository, VaultError};

fn open_temp_store(dir: &tempfile::TempDir) -> StoreDb {
    StoreDb::open(&dir.path().join("test.db")).expect("open should succeed")
}

// -------------------------------------------------------------------------
// Open and migrate
// -------------------------------------------------------------------------

#[test]
fn open_creates_database_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let _db = open_temp_store(&dir);
    let metadata = std::fs::metadata(dir.path().join("test.db")).expect("file should exist");
    assert!(metadata.len() > 0);
}

#[test]
fn migrations_reach_latest_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_temp_store(&dir);
    assert_eq!(db.schema_version().unwrap(), 2);
}

#[test]
fn expected_tables_exist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_temp_store(&dir);

    let mut stmt = db
        .connection()
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    for expected in ["accounts", "directories", "k_records", "store_meta"] {
        assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
    }
}

#[test]
fn reopen_keeps_rows_and_single_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.db");
    {
        let db = StoreDb::open(&path).unwrap();
        let root = root_id(db.connection()).unwrap();
        Directories::insert(db.connection(), &[NewDirectory::new("Banking", root)]).unwrap();
        db.close().unwrap();
    }

    let db = StoreDb::open(&path).expect("reopen should succeed");
    assert_eq!(db.schema_version().unwrap(), 2);
    let roots = Directories::select(db.connection(), &DirectoryFilter::Root).unwrap();
    assert_eq!(roots.len(), 1);
    let children = Directories::select(db.connection(), &DirectoryFilter::InRoot).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "Banking");
}

#[test]
fn open_on_garbage_file_is_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![0xAB; 4096]).unwrap();
    let result = StoreDb::open(&path);
    assert!(matches!(result, Err(VaultError::StoreUnavailable(_))));
}

// -------------------------------------------------------------------------
// Schema backstops: raw SQL bypassing the repositories still cannot
// break the root invariants.
// -------------------------------------------------------------------------

#[test]
fn raw_second_root_is_rejected() {
    let db = StoreDb::open_in_memory().unwrap();
    let result = db
        .connection()
        .execute("INSERT INTO directories (name, parent_id) VALUES ('Root', NULL)", []);
    assert!(result.is_err());
}

#[test]
fn raw_parentless_directory_is_rejected() {
    let db = StoreDb::open_in_memory().unwrap();
    let result = db
        .connection()
        .execute("INSERT INTO directories (name, parent_id) VALUES ('Loose', NULL)", []);
    assert!(result.is_err());
}

#[test]
fn raw_root_delete_is_aborted() {
    let db = StoreDb::open_in_memory().unwrap();
    let result = db
        .connection()
        .execute("DELETE FROM directories WHERE parent_id IS NULL", []);
    assert!(result.is_err());
    assert!(root_id(db.connection()).is_ok());
}

#[test]
fn raw_root_rename_is_rejected() {
    let db = StoreDb::open_in_memory().unwrap();
    let result = db
        .connection()
        .execute("UPDATE directories SET name = 'Top' WHERE parent_id IS NULL", []);
    assert!(result.is_err());
}

#[test]
fn raw_k_with_short_nonce_is_rejected() {
    let db = StoreDb::open_in_memory().unwrap();
    let conn = db.connection();
    let root = root_id(conn).unwrap();
    conn.execute(
        "INSERT INTO accounts (id, account_name, user_name, secret_ciphertext, created_at, \
         updated_at, parent_id) VALUES ('a1', 'n', 'u', x'00', 0, 0, ?1)",
        [root],
    )
    .unwrap();
    let result = conn.execute(
        "INSERT INTO k_records (account_id, nonce, tag_length_bits, deadline_ms) \
         VALUES ('a1', x'0000', 128, 0)",
        [],
    );
    assert!(result.is_err());
}
