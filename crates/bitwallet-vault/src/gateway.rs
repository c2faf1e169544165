//! Async handle over one store connection.
//!
//! Every call runs on tokio's blocking pool and is serialized by a mutex
//! around the connection, so writers never interleave. Once the store is
//! closed every call fails fast with [`VaultError::StoreUnavailable`].
//!
//! A handle carries the [`StoreConfig`] it was opened with; the
//! `*_for_lifetime` variants and [`Store::derive_store_key`] read it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use bitwallet_crypto_core::{KdfParams, KeyState, RevealedSecret, SecretKey};
use tokio::task::JoinError;
use zeroize::Zeroizing;

use crate::accounts::{Account, Accounts, NewAccount};
use crate::cipher_params::KRecord;
use crate::config::StoreConfig;
use crate::db::StoreDb;
use crate::directories::{self, Directory};
use crate::error::VaultError;
use crate::keys;
use crate::master_key;
use crate::repository::{BatchOutcome, Repository};
use crate::time::now_millis;

/// Shared connection slot. `None` once closed.
type ManagedStore = Arc<Mutex<Option<StoreDb>>>;

/// Cloneable handle to an open store. The connection is released by
/// [`close`](Self::close) or when the last handle is dropped.
#[derive(Clone, Debug)]
pub struct Store {
    inner: ManagedStore,
    config: Arc<StoreConfig>,
}

fn task_failed(err: JoinError) -> VaultError {
    VaultError::StoreUnavailable(format!("storage task failed: {err}"))
}

impl Store {
    /// Open (or create) the store database at `path`.
    ///
    /// # Errors
    ///
    /// See [`StoreDb::open`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || StoreDb::open(&path))
            .await
            .map_err(task_failed)??;
        Ok(Self::from_db(db))
    }

    /// Open (or create) the database named by `config` inside `data_dir`
    /// and keep `config` on the handle.
    ///
    /// # Errors
    ///
    /// See [`StoreDb::open`].
    pub async fn open_with_config(data_dir: &Path, config: StoreConfig) -> Result<Self, VaultError> {
        let path = config.database_path(data_dir);
        let db = tokio::task::spawn_blocking(move || StoreDb::open(&path))
            .await
            .map_err(task_failed)??;
        Ok(Self::from_db(db).with_config(config))
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// See [`StoreDb::open_in_memory`].
    pub async fn open_in_memory() -> Result<Self, VaultError> {
        let db = tokio::task::spawn_blocking(StoreDb::open_in_memory)
            .await
            .map_err(task_failed)??;
        Ok(Self::from_db(db))
    }

    /// Wrap an already opened database with the default configuration.
    #[must_use]
    pub fn from_db(db: StoreDb) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(db))),
            config: Arc::new(StoreConfig::default()),
        }
    }

    /// Replace the configuration carried by this handle. Existing clones
    /// keep the one they had.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Configuration this handle was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Release the connection. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`VaultError::StoreUnavailable`] if the lock is poisoned; otherwise
    /// whatever `SQLite` reports on close.
    pub async fn close(&self) -> Result<(), VaultError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let db = inner
                .lock()
                .map_err(|_| VaultError::StoreUnavailable("store lock poisoned".into()))?
                .take();
            match db {
                Some(db) => {
                    db.close()?;
                    tracing::info!("store closed");
                }
                None => tracing::debug!("store already closed"),
            }
            Ok(())
        })
        .await
        .map_err(task_failed)?
    }

    /// `true` until [`close`](Self::close) has run.
    pub async fn is_open(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.lock().is_ok_and(|slot| slot.is_some()))
            .await
            .unwrap_or(false)
    }

    /// Run `f` against the open database on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, VaultError>
    where
        T: Send + 'static,
        F: FnOnce(&StoreDb) -> Result<T, VaultError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let slot = inner
                .lock()
                .map_err(|_| VaultError::StoreUnavailable("store lock poisoned".into()))?;
            let db = slot
                .as_ref()
                .ok_or_else(|| VaultError::StoreUnavailable("store is closed".into()))?;
            f(db)
        })
        .await
        .map_err(task_failed)?
    }

    // -- Generic CRUD -------------------------------------------------------

    /// Rows of `R` matching `filter`.
    ///
    /// # Errors
    ///
    /// See [`Repository::select`].
    pub async fn select<R>(&self, filter: R::Filter) -> Result<Vec<R::Entity>, VaultError>
    where
        R: Repository + 'static,
    {
        self.run(move |db| R::select(db.connection(), &filter)).await
    }

    /// Insert `drafts`, returning the rows actually persisted.
    ///
    /// # Errors
    ///
    /// See [`Repository::insert`].
    pub async fn insert<R>(&self, drafts: Vec<R::Draft>) -> Result<Vec<R::Entity>, VaultError>
    where
        R: Repository + 'static,
    {
        self.run(move |db| R::insert(db.connection(), &drafts)).await
    }

    /// Update `entities`, returning the rows actually persisted.
    ///
    /// # Errors
    ///
    /// See [`Repository::update`].
    pub async fn update<R>(&self, entities: Vec<R::Entity>) -> Result<Vec<R::Entity>, VaultError>
    where
        R: Repository + 'static,
    {
        self.run(move |db| R::update(db.connection(), &entities)).await
    }

    /// Delete rows by id.
    ///
    /// # Errors
    ///
    /// See [`Repository::delete`].
    pub async fn delete<R>(&self, ids: Vec<R::Id>) -> Result<BatchOutcome, VaultError>
    where
        R: Repository + 'static,
    {
        self.run(move |db| R::delete(db.connection(), &ids)).await
    }

    // -- Directory tree -----------------------------------------------------

    /// The reserved root directory.
    ///
    /// # Errors
    ///
    /// See [`directories::root_directory`].
    pub async fn root_directory(&self) -> Result<Directory, VaultError> {
        self.run(|db| directories::root_directory(db.connection()))
            .await
    }

    // -- Key lifecycle ------------------------------------------------------

    /// Seal `secret` under `key` and insert the account with its K record.
    ///
    /// # Errors
    ///
    /// - Everything [`keys::seal_account`] and [`Accounts`] insert return.
    /// - [`VaultError::ConstraintViolation`] if the store rejects the row
    ///   (for instance a duplicate id).
    pub async fn store_secret(
        &self,
        account: NewAccount,
        secret: &[u8],
        key: &SecretKey,
        deadline_ms: i64,
    ) -> Result<Account, VaultError> {
        let secret = Zeroizing::new(secret.to_vec());
        let key = key.clone();
        self.run(move |db| {
            let id = account.id.clone();
            let sealed = keys::seal_account(account, &secret, &key, deadline_ms)?;
            Accounts::insert(db.connection(), &[sealed])?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    VaultError::ConstraintViolation(format!("account {id:?} was rejected by the store"))
                })
        })
        .await
    }

    /// [`store_secret`](Self::store_secret) with a deadline
    /// `keyLifetimeDays` from now.
    ///
    /// # Errors
    ///
    /// See [`store_secret`](Self::store_secret).
    pub async fn store_secret_for_lifetime(
        &self,
        account: NewAccount,
        secret: &[u8],
        key: &SecretKey,
    ) -> Result<Account, VaultError> {
        let deadline_ms = self.config.default_deadline(now_millis());
        self.store_secret(account, secret, key, deadline_ms).await
    }

    /// Decrypt the secret of `account_id`.
    ///
    /// # Errors
    ///
    /// See [`keys::reveal_secret`].
    pub async fn reveal_secret(
        &self,
        account_id: impl Into<String>,
        key: &SecretKey,
    ) -> Result<RevealedSecret, VaultError> {
        let account_id = account_id.into();
        let key = key.clone();
        self.run(move |db| keys::reveal_secret(db.connection(), &account_id, &key))
            .await
    }

    /// Re-seal the secret of `account_id` under `new_key`.
    ///
    /// # Errors
    ///
    /// See [`keys::rotate`].
    pub async fn rotate_key(
        &self,
        account_id: impl Into<String>,
        current_key: &SecretKey,
        new_key: &SecretKey,
        new_deadline_ms: i64,
    ) -> Result<KRecord, VaultError> {
        let account_id = account_id.into();
        let current_key = current_key.clone();
        let new_key = new_key.clone();
        self.run(move |db| {
            keys::rotate(
                db.connection(),
                &account_id,
                &current_key,
                &new_key,
                new_deadline_ms,
            )
        })
        .await
    }

    /// [`rotate_key`](Self::rotate_key) with a deadline `keyLifetimeDays`
    /// from now.
    ///
    /// # Errors
    ///
    /// See [`keys::rotate`].
    pub async fn rotate_key_for_lifetime(
        &self,
        account_id: impl Into<String>,
        current_key: &SecretKey,
        new_key: &SecretKey,
    ) -> Result<KRecord, VaultError> {
        let deadline_ms = self.config.default_deadline(now_millis());
        self.rotate_key(account_id, current_key, new_key, deadline_ms)
            .await
    }

    /// Push the deadline of `account_id` later.
    ///
    /// # Errors
    ///
    /// See [`keys::extend_deadline`].
    pub async fn extend_deadline(
        &self,
        account_id: impl Into<String>,
        new_deadline_ms: i64,
    ) -> Result<KRecord, VaultError> {
        let account_id = account_id.into();
        self.run(move |db| keys::extend_deadline(db.connection(), &account_id, new_deadline_ms))
            .await
    }

    /// Active or expired, without decrypting.
    ///
    /// # Errors
    ///
    /// See [`keys::key_state`].
    pub async fn key_state(&self, account_id: impl Into<String>) -> Result<KeyState, VaultError> {
        let account_id = account_id.into();
        self.run(move |db| keys::key_state(db.connection(), &account_id))
            .await
    }

    /// Derive the store key from a passphrase.
    ///
    /// # Errors
    ///
    /// See [`master_key::derive_master_key`].
    pub async fn derive_master_key(
        &self,
        passphrase: &[u8],
        params: KdfParams,
    ) -> Result<SecretKey, VaultError> {
        let passphrase = Zeroizing::new(passphrase.to_vec());
        self.run(move |db| master_key::derive_master_key(db.connection(), &passphrase, &params))
            .await
    }

    /// Derive the store key from a passphrase with the configured KDF cost.
    ///
    /// # Errors
    ///
    /// See [`master_key::derive_master_key`].
    pub async fn derive_store_key(&self, passphrase: &[u8]) -> Result<SecretKey, VaultError> {
        self.derive_master_key(passphrase, self.config.kdf.clone())
            .await
    }
}
