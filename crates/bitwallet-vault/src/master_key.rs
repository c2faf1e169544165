//! Passphrase-derived store key.
//!
//! For callers that hold a passphrase rather than a raw key: a random salt
//! is generated once per store and kept in `store_meta`; the key is derived
//! with Argon2id on every call and never written anywhere.

use bitwallet_crypto_core::{derive_key, generate_salt, KdfParams, SecretKey, SALT_LEN};
use rusqlite::{Connection, OptionalExtension};

use crate::error::VaultError;

const SALT_META_KEY: &str = "kdf_salt";

/// Return the store's KDF salt, creating it on first use.
///
/// # Errors
///
/// - [`VaultError::Crypto`] if the CSPRNG fails.
/// - [`VaultError::Database`] if the stored salt has the wrong length.
pub fn load_or_create_salt(conn: &Connection) -> Result<[u8; SALT_LEN], VaultError> {
    let fresh = generate_salt()?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO store_meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![SALT_META_KEY, fresh.as_slice()],
    )?;
    if inserted > 0 {
        tracing::info!("generated store kdf salt");
        return Ok(fresh);
    }

    let stored: Option<Vec<u8>> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            [SALT_META_KEY],
            |row| row.get(0),
        )
        .optional()?;
    let stored = stored.ok_or_else(|| VaultError::NotFound("kdf salt".into()))?;
    <[u8; SALT_LEN]>::try_from(stored.as_slice()).map_err(|_| {
        VaultError::Database(format!(
            "stored kdf salt is {} bytes, expected {SALT_LEN}",
            stored.len()
        ))
    })
}

/// Derive the store key from `passphrase` and the store salt.
///
/// # Errors
///
/// Same as [`load_or_create_salt`], plus [`VaultError::Crypto`] if
/// derivation fails.
pub fn derive_master_key(
    conn: &Connection,
    passphrase: &[u8],
    params: &KdfParams,
) -> Result<SecretKey, VaultError> {
    let salt = load_or_create_salt(conn)?;
    Ok(derive_key(passphrase, &salt, params)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreDb;

    const TEST_KDF: KdfParams = KdfParams {
        m_cost: 64,
        t_cost: 1,
        p_cost: 1,
    };

    #[test]
    fn salt_is_stable_per_store() {
        let db = StoreDb::open_in_memory().unwrap();
        let first = load_or_create_salt(db.connection()).unwrap();
        let second = load_or_create_salt(db.connection()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_stores_get_different_salts() {
        let a = StoreDb::open_in_memory().unwrap();
        let b = StoreDb::open_in_memory().unwrap();
        assert_ne!(
            load_or_create_salt(a.connection()).unwrap(),
            load_or_create_salt(b.connection()).unwrap()
        );
    }

    #[test]
    fn same_passphrase_same_key() {
        let db = StoreDb::open_in_memory().unwrap();
        let a = derive_master_key(db.connection(), b"pw", &TEST_KDF).unwrap();
        let b = derive_master_key(db.connection(), b"pw", &TEST_KDF).unwrap();
        let c = derive_master_key(db.connection(), b"other", &TEST_KDF).unwrap();
        assert_eq!(a.expose(), b.expose());
        assert_ne!(a.expose(), c.expose());
    }
}
