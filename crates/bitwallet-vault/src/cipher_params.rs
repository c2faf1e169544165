//! K records: the nonce, tag length and deadline needed to open one
//! account's sealed secret. The key itself is never stored.

use bitwallet_crypto_core::{CipherParams, KeyState};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{is_row_rejection, VaultError};
use crate::repository::{BatchOutcome, Repository};
use crate::time::now_millis;

const SELECT_COLUMNS: &str =
    "SELECT id, account_id, nonce, tag_length_bits, deadline_ms FROM k_records";

/// Stored cipher parameters for one account (1:1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KRecord {
    pub id: i64,
    pub account_id: String,
    pub nonce: Vec<u8>,
    pub tag_length_bits: u32,
    /// Epoch milliseconds after which decryption is refused.
    pub deadline_ms: i64,
}

impl KRecord {
    /// Parameters to hand to [`bitwallet_crypto_core::decrypt`].
    #[must_use]
    pub fn cipher_params(&self) -> CipherParams {
        CipherParams {
            nonce: self.nonce.clone(),
            tag_length_bits: self.tag_length_bits,
            deadline_ms: self.deadline_ms,
        }
    }

    /// Active or expired at `now_ms`.
    #[must_use]
    pub const fn state_at(&self, now_ms: i64) -> KeyState {
        KeyState::at(self.deadline_ms, now_ms)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            nonce: row.get(2)?,
            tag_length_bits: row.get(3)?,
            deadline_ms: row.get(4)?,
        })
    }
}

/// A K row to insert. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKRecord {
    pub account_id: String,
    pub nonce: Vec<u8>,
    pub tag_length_bits: u32,
    pub deadline_ms: i64,
}

impl NewKRecord {
    /// Build from the parameters emitted by a seal.
    #[must_use]
    pub fn from_params(account_id: impl Into<String>, params: CipherParams) -> Self {
        Self {
            account_id: account_id.into(),
            nonce: params.nonce,
            tag_length_bits: params.tag_length_bits,
            deadline_ms: params.deadline_ms,
        }
    }

    fn validate(&self) -> Result<(), VaultError> {
        CipherParams {
            nonce: self.nonce.clone(),
            tag_length_bits: self.tag_length_bits,
            deadline_ms: self.deadline_ms,
        }
        .validate()?;
        Ok(())
    }
}

/// K selection criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KFilter {
    All,
    ById(i64),
    ByAccount(String),
}

/// [`Repository`] over the `k_records` table.
///
/// Updates keep the owning account's `expires_at` and `is_expired` in step
/// with the new deadline. [`extend_deadline`](crate::extend_deadline) is the
/// checked way to move a deadline later.
#[derive(Debug, Clone, Copy, Default)]
pub struct KRecords;

/// Fetch the K record of `account_id`, if any.
pub(crate) fn for_account(conn: &Connection, account_id: &str) -> Result<Option<KRecord>, VaultError> {
    Ok(KRecords::select(conn, &KFilter::ByAccount(account_id.to_owned()))?
        .into_iter()
        .next())
}

/// Insert one K row and return its id.
pub(crate) fn insert_row(conn: &Connection, k: &NewKRecord) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO k_records (account_id, nonce, tag_length_bits, deadline_ms) \
         VALUES (?1, ?2, ?3, ?4)",
        params![k.account_id, k.nonce, k.tag_length_bits, k.deadline_ms],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Rewrite one K row and mirror its deadline onto the owning account.
fn update_one(conn: &Connection, k: &KRecord, now_ms: i64) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE k_records SET account_id = ?1, nonce = ?2, tag_length_bits = ?3, \
         deadline_ms = ?4 WHERE id = ?5",
        params![k.account_id, k.nonce, k.tag_length_bits, k.deadline_ms, k.id],
    )?;
    if changed > 0 {
        let expired = k.state_at(now_ms) == KeyState::Expired;
        tx.execute(
            "UPDATE accounts SET is_expired = ?1, expires_at = ?2, updated_at = ?3 WHERE id = ?4",
            params![expired, k.deadline_ms, now_ms, k.account_id],
        )?;
    }
    tx.commit()?;
    Ok(changed)
}

fn account_exists(conn: &Connection, account_id: &str) -> Result<bool, VaultError> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?1)",
        [account_id],
        |row| row.get(0),
    )?;
    Ok(found)
}

fn validate_owner(conn: &Connection, account_id: &str) -> Result<(), VaultError> {
    if account_exists(conn, account_id)? {
        Ok(())
    } else {
        Err(VaultError::ConstraintViolation(format!(
            "account {account_id:?} does not exist"
        )))
    }
}

impl Repository for KRecords {
    type Entity = KRecord;
    type Draft = NewKRecord;
    type Id = i64;
    type Filter = KFilter;

    fn select(conn: &Connection, filter: &KFilter) -> Result<Vec<KRecord>, VaultError> {
        let rows = match filter {
            KFilter::All => {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
                let rows = stmt.query_map([], KRecord::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            KFilter::ById(id) => {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
                let rows = stmt.query_map([id], KRecord::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            KFilter::ByAccount(account_id) => {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE account_id = ?1"))?;
                let rows = stmt.query_map([account_id], KRecord::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        tracing::debug!(?filter, count = rows.len(), "selected k records");
        Ok(rows)
    }

    fn insert(conn: &Connection, drafts: &[NewKRecord]) -> Result<Vec<KRecord>, VaultError> {
        for draft in drafts {
            draft.validate()?;
            validate_owner(conn, &draft.account_id)?;
        }

        let mut inserted = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match insert_row(conn, draft) {
                Ok(id) => inserted.push(KRecord {
                    id,
                    account_id: draft.account_id.clone(),
                    nonce: draft.nonce.clone(),
                    tag_length_bits: draft.tag_length_bits,
                    deadline_ms: draft.deadline_ms,
                }),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(account_id = %draft.account_id, error = %e, "k record insert skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(requested = drafts.len(), inserted = inserted.len(), "inserted k records");
        Ok(inserted)
    }

    fn update(conn: &Connection, entities: &[KRecord]) -> Result<Vec<KRecord>, VaultError> {
        for k in entities {
            k.cipher_params().validate()?;
            validate_owner(conn, &k.account_id)?;
        }

        let now = now_millis();
        let mut updated = Vec::with_capacity(entities.len());
        for k in entities {
            match update_one(conn, k, now) {
                Ok(0) => tracing::warn!(id = k.id, "k record update skipped: no such row"),
                Ok(_) => updated.push(k.clone()),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(id = k.id, error = %e, "k record update skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(requested = entities.len(), updated = updated.len(), "updated k records");
        Ok(updated)
    }

    fn delete(conn: &Connection, ids: &[i64]) -> Result<BatchOutcome, VaultError> {
        let mut stmt = conn.prepare("DELETE FROM k_records WHERE id = ?1")?;
        let mut deleted = 0usize;
        for id in ids {
            match stmt.execute([id]) {
                Ok(0) => tracing::warn!(id, "k record delete skipped: no such row"),
                Ok(_) => deleted = deleted.saturating_add(1),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(id, error = %e, "k record delete refused");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let outcome = BatchOutcome::from_counts(ids.len(), deleted);
        tracing::debug!(requested = ids.len(), deleted, ?outcome, "deleted k records");
        Ok(outcome)
    }
}
