//! Account records: credential metadata plus one sealed secret.
//!
//! The secret column is written only through [`SealedAccount`] (see
//! [`crate::keys::seal_account`]) and by key rotation. Generic updates
//! change metadata and never touch it.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::cipher_params::{self, NewKRecord};
use crate::directories::{self, ROOT_DIRECTORY_NAME};
use crate::error::{is_row_rejection, VaultError};
use crate::repository::{BatchOutcome, Repository};
use crate::time::now_millis;

const SELECT_COLUMNS: &str = "SELECT id, account_name, user_name, url, brief, secret_ciphertext, \
     is_expired, created_at, updated_at, expires_at, parent_id FROM accounts";

/// A stored credential.
///
/// Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub account_name: String,
    pub user: String,
    pub url: Option<String>,
    pub brief: Option<String>,
    #[serde(skip)]
    pub(crate) secret_ciphertext: Vec<u8>,
    pub is_expired: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: Option<i64>,
    pub parent_id: i64,
}

impl Account {
    /// Sealed secret as stored: `ciphertext || tag`.
    #[must_use]
    pub fn secret_ciphertext(&self) -> &[u8] {
        &self.secret_ciphertext
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_name: row.get(1)?,
            user: row.get(2)?,
            url: row.get(3)?,
            brief: row.get(4)?,
            secret_ciphertext: row.get(5)?,
            is_expired: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            expires_at: row.get(9)?,
            parent_id: row.get(10)?,
        })
    }
}

/// Account metadata supplied by the caller before sealing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub id: String,
    pub account_name: String,
    pub user: String,
    pub url: Option<String>,
    pub brief: Option<String>,
    pub expires_at: Option<i64>,
    pub parent_id: i64,
}

impl NewAccount {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        account_name: impl Into<String>,
        user: impl Into<String>,
        parent_id: i64,
    ) -> Self {
        Self {
            id: id.into(),
            account_name: account_name.into(),
            user: user.into(),
            url: None,
            brief: None,
            expires_at: None,
            parent_id,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_brief(mut self, brief: impl Into<String>) -> Self {
        self.brief = Some(brief.into());
        self
    }
}

/// An account whose secret has been sealed, ready to insert together with
/// its K record. Only [`crate::keys::seal_account`] builds one.
#[derive(Debug, Clone)]
pub struct SealedAccount {
    pub(crate) account: Account,
    pub(crate) k: NewKRecord,
}

impl SealedAccount {
    /// The account row that will be written.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// The K row that will be written alongside it.
    #[must_use]
    pub const fn k_record(&self) -> &NewKRecord {
        &self.k
    }
}

/// Account selection criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    All,
    ById(String),
    /// Accounts directly inside a directory.
    InParent(i64),
    /// Accounts directly inside the root.
    InRoot,
}

/// [`Repository`] over the `accounts` table. Inserts also write the K row.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accounts;

/// Fetch one account by id.
pub(crate) fn find(conn: &Connection, id: &str) -> Result<Option<Account>, VaultError> {
    Ok(Accounts::select(conn, &AccountFilter::ById(id.to_owned()))?
        .into_iter()
        .next())
}

/// Replace the sealed secret of `id`. Returns `false` when no row matched.
pub(crate) fn replace_secret(
    conn: &Connection,
    id: &str,
    ciphertext: &[u8],
    expires_at: i64,
    now_ms: i64,
) -> Result<bool, VaultError> {
    let changed = conn.execute(
        "UPDATE accounts SET secret_ciphertext = ?1, is_expired = 0, expires_at = ?2, \
         updated_at = ?3 WHERE id = ?4",
        params![ciphertext, expires_at, now_ms, id],
    )?;
    Ok(changed > 0)
}

fn validate_id(id: &str) -> Result<(), VaultError> {
    if id.is_empty() {
        Err(VaultError::ConstraintViolation(
            "account id must not be empty".into(),
        ))
    } else {
        Ok(())
    }
}

fn validate_parent(conn: &Connection, account_id: &str, parent_id: i64) -> Result<(), VaultError> {
    if directories::exists(conn, parent_id)? {
        Ok(())
    } else {
        Err(VaultError::ConstraintViolation(format!(
            "account {account_id}: parent directory {parent_id} does not exist"
        )))
    }
}

fn insert_one(conn: &Connection, sealed: &SealedAccount) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    let a = &sealed.account;
    tx.execute(
        "INSERT INTO accounts (id, account_name, user_name, url, brief, secret_ciphertext, \
         is_expired, created_at, updated_at, expires_at, parent_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            a.id,
            a.account_name,
            a.user,
            a.url,
            a.brief,
            a.secret_ciphertext,
            a.is_expired,
            a.created_at,
            a.updated_at,
            a.expires_at,
            a.parent_id
        ],
    )?;
    cipher_params::insert_row(&tx, &sealed.k)?;
    tx.commit()
}

impl Repository for Accounts {
    type Entity = Account;
    type Draft = SealedAccount;
    type Id = String;
    type Filter = AccountFilter;

    fn select(conn: &Connection, filter: &AccountFilter) -> Result<Vec<Account>, VaultError> {
        let rows = match filter {
            AccountFilter::All => {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
                let rows = stmt.query_map([], Account::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            AccountFilter::ById(id) => {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
                let rows = stmt.query_map([id], Account::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            AccountFilter::InParent(parent) => {
                let mut stmt =
                    conn.prepare(&format!("{SELECT_COLUMNS} WHERE parent_id = ?1 ORDER BY id"))?;
                let rows = stmt.query_map([parent], Account::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            AccountFilter::InRoot => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE parent_id = \
                     (SELECT id FROM directories WHERE parent_id IS NULL AND name = ?1) \
                     ORDER BY id"
                ))?;
                let rows = stmt.query_map([ROOT_DIRECTORY_NAME], Account::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        tracing::debug!(?filter, count = rows.len(), "selected accounts");
        Ok(rows)
    }

    fn insert(conn: &Connection, drafts: &[SealedAccount]) -> Result<Vec<Account>, VaultError> {
        for draft in drafts {
            validate_id(&draft.account.id)?;
            validate_parent(conn, &draft.account.id, draft.account.parent_id)?;
        }

        let mut inserted = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match insert_one(conn, draft) {
                Ok(()) => inserted.push(draft.account.clone()),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(account_id = %draft.account.id, error = %e, "account insert skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(requested = drafts.len(), inserted = inserted.len(), "inserted accounts");
        Ok(inserted)
    }

    fn update(conn: &Connection, entities: &[Account]) -> Result<Vec<Account>, VaultError> {
        for account in entities {
            validate_id(&account.id)?;
            validate_parent(conn, &account.id, account.parent_id)?;
        }

        let now = now_millis();
        let mut stmt = conn.prepare(
            "UPDATE accounts SET account_name = ?1, user_name = ?2, url = ?3, brief = ?4, \
             is_expired = ?5, expires_at = ?6, parent_id = ?7, updated_at = ?8 WHERE id = ?9",
        )?;
        let mut updated = Vec::with_capacity(entities.len());
        for a in entities {
            let result = stmt.execute(params![
                a.account_name,
                a.user,
                a.url,
                a.brief,
                a.is_expired,
                a.expires_at,
                a.parent_id,
                now,
                a.id
            ]);
            match result {
                Ok(0) => tracing::warn!(account_id = %a.id, "account update skipped: no such row"),
                Ok(_) => {
                    if let Some(stored) = find(conn, &a.id)? {
                        updated.push(stored);
                    }
                }
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(account_id = %a.id, error = %e, "account update skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(requested = entities.len(), updated = updated.len(), "updated accounts");
        Ok(updated)
    }

    fn delete(conn: &Connection, ids: &[String]) -> Result<BatchOutcome, VaultError> {
        let mut stmt = conn.prepare("DELETE FROM accounts WHERE id = ?1")?;
        let mut deleted = 0usize;
        for id in ids {
            match stmt.execute([id]) {
                Ok(0) => tracing::warn!(account_id = %id, "account delete skipped: no such row"),
                Ok(_) => deleted = deleted.saturating_add(1),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(account_id = %id, error = %e, "account delete refused");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let outcome = BatchOutcome::from_counts(ids.len(), deleted);
        tracing::debug!(requested = ids.len(), deleted, ?outcome, "deleted accounts");
        Ok(outcome)
    }
}
