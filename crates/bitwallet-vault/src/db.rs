//! `SQLite` connection setup and migration runner.
//!
//! Secrets are sealed per field before they reach the database, so the
//! file itself is plain `SQLite`. Opening a store enables WAL and foreign
//! keys, applies pending migrations, and checks the root directory exists.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::directories::ROOT_DIRECTORY_NAME;
use crate::error::VaultError;

/// Forward-only SQL migrations, embedded at compile time.
/// Index 0 → version 1, index 1 → version 2, etc.
const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/001_initial_schema.sql"),
    include_str!("../migrations/002_store_meta.sql"),
];

/// How long a statement waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to an open, migrated store database.
///
/// All row I/O flows through the [`Connection`] held here.
pub struct StoreDb {
    conn: Connection,
}

impl fmt::Debug for StoreDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDb")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl StoreDb {
    /// Open (or create) the store database at `path`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::StoreUnavailable`] if the file cannot be opened or is
    ///   not a database.
    /// - [`VaultError::Migration`] if a migration fails.
    /// - [`VaultError::Database`] if the root directory is missing.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        let conn = Connection::open(path)?;
        let db = Self::prepare(conn)?;
        tracing::info!(path = %path.display(), version = db.schema_version()?, "store opened");
        Ok(db)
    }

    /// Open a private in-memory store. Used by tests and throwaway sessions.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_in_memory() -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()?;
        let db = Self::prepare(conn)?;
        tracing::debug!("in-memory store opened");
        Ok(db)
    }

    fn prepare(conn: Connection) -> Result<Self, VaultError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // In-memory databases stay in "memory" journal mode.
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let mut db = Self { conn };
        db.run_migrations()?;
        db.verify_root()?;
        Ok(db)
    }

    /// Returns a reference to the underlying [`rusqlite::Connection`].
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the current schema version (`PRAGMA user_version`).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the pragma query fails.
    pub fn schema_version(&self) -> Result<i32, VaultError> {
        let v: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(v)
    }

    /// Close the connection, surfacing any error `SQLite` reports on close.
    ///
    /// # Errors
    ///
    /// Returns the mapped `SQLite` error if the close fails.
    pub fn close(self) -> Result<(), VaultError> {
        self.conn.close().map_err(|(_, e)| VaultError::from(e))
    }

    /// Apply all pending migrations sequentially.
    ///
    /// Each migration is wrapped in a transaction. The `user_version` pragma
    /// is bumped atomically on commit.
    fn run_migrations(&mut self) -> Result<(), VaultError> {
        let current = self.schema_version()?;

        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            let version = idx
                .checked_add(1)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| VaultError::Migration("migration index overflow".into()))?;

            if version <= current {
                continue;
            }

            let tx = self.conn.transaction().map_err(|e| {
                VaultError::Migration(format!(
                    "failed to start transaction for migration {version}: {e}"
                ))
            })?;

            tx.execute_batch(sql)
                .map_err(|e| VaultError::Migration(format!("migration {version} failed: {e}")))?;

            tx.pragma_update(None, "user_version", version)
                .map_err(|e| {
                    VaultError::Migration(format!(
                        "failed to update user_version to {version}: {e}"
                    ))
                })?;

            tx.commit().map_err(|e| {
                VaultError::Migration(format!("failed to commit migration {version}: {e}"))
            })?;

            tracing::info!(version, "applied migration");
        }

        Ok(())
    }

    fn verify_root(&self) -> Result<(), VaultError> {
        let roots: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM directories WHERE parent_id IS NULL AND name = ?1",
            [ROOT_DIRECTORY_NAME],
            |row| row.get(0),
        )?;
        if roots == 1 {
            Ok(())
        } else {
            Err(VaultError::Database(format!(
                "expected exactly one root directory, found {roots}"
            )))
        }
    }
}
