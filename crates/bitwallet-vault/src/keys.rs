//! Key lifecycle: seal, reveal, rotate and extend account secrets.
//!
//! Each account secret is sealed with AES-256-GCM under a caller-held
//! 256-bit key. The account id is bound as associated data, so a sealed
//! secret copied onto another account fails authentication. The K record
//! carries the nonce, tag length and deadline; once the deadline passes the
//! secret cannot be revealed until the caller extends or rotates it.

use bitwallet_crypto_core::{decrypt, encrypt, KeyState, RevealedSecret, SecretKey};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use crate::accounts::{self, Account, NewAccount, SealedAccount};
use crate::cipher_params::{self, KRecord, NewKRecord};
use crate::error::VaultError;
use crate::time::now_millis;

/// Domain separation for the associated data of account secrets.
const AAD_PREFIX: &[u8] = b"bitwallet-account-secret-v1:";

/// Associated data binding a sealed secret to its account.
#[must_use]
pub fn account_aad(account_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len().saturating_add(account_id.len()));
    aad.extend_from_slice(AAD_PREFIX);
    aad.extend_from_slice(account_id.as_bytes());
    aad
}

fn require_future(deadline_ms: i64, now_ms: i64) -> Result<(), VaultError> {
    if deadline_ms > now_ms {
        Ok(())
    } else {
        Err(VaultError::ConstraintViolation(format!(
            "deadline {deadline_ms} is not in the future"
        )))
    }
}

/// Seal `secret` for a new account, ready for [`crate::Accounts`] insert.
///
/// # Errors
///
/// - [`VaultError::ConstraintViolation`] for an empty id or a deadline
///   that is not in the future.
/// - [`VaultError::Crypto`] if encryption fails.
pub fn seal_account(
    account: NewAccount,
    secret: &[u8],
    key: &SecretKey,
    deadline_ms: i64,
) -> Result<SealedAccount, VaultError> {
    let now = now_millis();
    if account.id.is_empty() {
        return Err(VaultError::ConstraintViolation(
            "account id must not be empty".into(),
        ));
    }
    require_future(deadline_ms, now)?;

    let sealed = encrypt(secret, key.expose(), &account_aad(&account.id))?;
    let k = NewKRecord::from_params(account.id.clone(), sealed.params(deadline_ms));

    Ok(SealedAccount {
        account: Account {
            id: account.id,
            account_name: account.account_name,
            user: account.user,
            url: account.url,
            brief: account.brief,
            secret_ciphertext: sealed.ciphertext,
            is_expired: false,
            created_at: now,
            updated_at: now,
            expires_at: account.expires_at.or(Some(deadline_ms)),
            parent_id: account.parent_id,
        },
        k,
    })
}

fn load_pair(conn: &Connection, account_id: &str) -> Result<(Account, KRecord), VaultError> {
    let account = accounts::find(conn, account_id)?
        .ok_or_else(|| VaultError::NotFound(format!("account {account_id:?}")))?;
    let k = cipher_params::for_account(conn, account_id)?
        .ok_or_else(|| VaultError::NotFound(format!("cipher parameters for account {account_id:?}")))?;
    Ok((account, k))
}

fn open_pair(
    account: &Account,
    k: &KRecord,
    key: &SecretKey,
    now_ms: i64,
) -> Result<RevealedSecret, VaultError> {
    Ok(decrypt(
        account.secret_ciphertext(),
        key.expose(),
        &k.cipher_params(),
        &account_aad(&account.id),
        now_ms,
    )?)
}

/// Decrypt the secret of `account_id` at the current time.
///
/// An expired key also sets the account's `is_expired` flag.
///
/// # Errors
///
/// - [`VaultError::NotFound`] if the account or its K record is missing.
/// - [`VaultError::Crypto`] with `ExpiredKey` past the deadline,
///   `Authentication` on a wrong key or tampered data.
pub fn reveal_secret(
    conn: &Connection,
    account_id: &str,
    key: &SecretKey,
) -> Result<RevealedSecret, VaultError> {
    let (account, k) = load_pair(conn, account_id)?;
    match open_pair(&account, &k, key, now_millis()) {
        Ok(secret) => {
            tracing::debug!(account_id = %account_id, "secret revealed");
            Ok(secret)
        }
        Err(e) if e.is_expired_key() => {
            tracing::warn!(account_id = %account_id, deadline_ms = k.deadline_ms, "key expired");
            if !account.is_expired {
                conn.execute(
                    "UPDATE accounts SET is_expired = 1 WHERE id = ?1",
                    [account_id],
                )?;
            }
            Err(e)
        }
        Err(e) => {
            tracing::warn!(account_id = %account_id, error = %e, "secret reveal failed");
            Err(e)
        }
    }
}

/// Re-seal the secret of `account_id` under `new_key` with a fresh nonce
/// and a new deadline, replacing its K record.
///
/// Runs in one immediate transaction: concurrent readers see either the
/// old pair or the new pair, never a mix.
///
/// # Errors
///
/// - [`VaultError::ConstraintViolation`] if `new_deadline_ms` is not in the future.
/// - [`VaultError::NotFound`] if the account or its K record is missing.
/// - [`VaultError::Crypto`] if the current secret cannot be opened
///   (expired, wrong key) or re-sealing fails.
pub fn rotate(
    conn: &Connection,
    account_id: &str,
    current_key: &SecretKey,
    new_key: &SecretKey,
    new_deadline_ms: i64,
) -> Result<KRecord, VaultError> {
    let now = now_millis();
    require_future(new_deadline_ms, now)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let (account, old_k) = load_pair(&tx, account_id)?;
    let plaintext = open_pair(&account, &old_k, current_key, now)?;
    let sealed = encrypt(plaintext.expose(), new_key.expose(), &account_aad(account_id))?;
    drop(plaintext);

    tx.execute("DELETE FROM k_records WHERE id = ?1", [old_k.id])?;
    accounts::replace_secret(&tx, account_id, &sealed.ciphertext, new_deadline_ms, now)?;
    let new_k = NewKRecord::from_params(account_id, sealed.params(new_deadline_ms));
    let id = cipher_params::insert_row(&tx, &new_k)?;
    tx.commit()?;

    tracing::info!(account_id = %account_id, old_k = old_k.id, new_k = id, "key rotated");
    Ok(KRecord {
        id,
        account_id: new_k.account_id,
        nonce: new_k.nonce,
        tag_length_bits: new_k.tag_length_bits,
        deadline_ms: new_k.deadline_ms,
    })
}

/// Move the deadline of `account_id` later without re-encrypting.
///
/// # Errors
///
/// - [`VaultError::NotFound`] if the K record is missing.
/// - [`VaultError::ConstraintViolation`] if `new_deadline_ms` is not in the
///   future or not later than the current deadline.
pub fn extend_deadline(
    conn: &Connection,
    account_id: &str,
    new_deadline_ms: i64,
) -> Result<KRecord, VaultError> {
    let now = now_millis();
    require_future(new_deadline_ms, now)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let mut k = cipher_params::for_account(&tx, account_id)?
        .ok_or_else(|| VaultError::NotFound(format!("cipher parameters for account {account_id:?}")))?;
    if new_deadline_ms <= k.deadline_ms {
        return Err(VaultError::ConstraintViolation(format!(
            "new deadline {new_deadline_ms} does not extend {}",
            k.deadline_ms
        )));
    }

    tx.execute(
        "UPDATE k_records SET deadline_ms = ?1 WHERE id = ?2",
        params![new_deadline_ms, k.id],
    )?;
    tx.execute(
        "UPDATE accounts SET is_expired = 0, expires_at = ?1, updated_at = ?2 WHERE id = ?3",
        params![new_deadline_ms, now, account_id],
    )?;
    tx.commit()?;

    tracing::info!(account_id = %account_id, deadline_ms = new_deadline_ms, "deadline extended");
    k.deadline_ms = new_deadline_ms;
    Ok(k)
}

/// Whether the key of `account_id` is still usable, without decrypting.
///
/// # Errors
///
/// [`VaultError::NotFound`] if the K record is missing.
pub fn key_state(conn: &Connection, account_id: &str) -> Result<KeyState, VaultError> {
    let k = cipher_params::for_account(conn, account_id)?
        .ok_or_else(|| VaultError::NotFound(format!("cipher parameters for account {account_id:?}")))?;
    Ok(k.state_at(now_millis()))
}
