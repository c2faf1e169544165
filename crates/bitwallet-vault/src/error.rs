//! Storage error types for `bitwallet-vault`.

use bitwallet_crypto_core::CryptoError;
use rusqlite::ffi::ErrorCode;
use thiserror::Error;

/// Errors produced by storage and key-lifecycle operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    ///
    /// Authentication failures and expired keys arrive here as
    /// [`CryptoError::Authentication`] and [`CryptoError::ExpiredKey`].
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The store is closed, locked, or could not be reached. Not retried.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A write was rejected before touching any row (reserved name,
    /// missing parent, cycle, missing owner).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Any other `SQLite` error.
    #[error("database error: {0}")]
    Database(String),

    /// Migration error during schema upgrade.
    #[error("migration error: {0}")]
    Migration(String),

    /// Requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// `true` when a tag failed to verify (tampering, wrong key).
    #[must_use]
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::Authentication))
    }

    /// `true` when decryption was refused because the key deadline passed.
    #[must_use]
    pub const fn is_expired_key(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::ExpiredKey { .. }))
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref ffi_err, _) = err {
            match ffi_err.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase => return Self::StoreUnavailable(err.to_string()),
                ErrorCode::ConstraintViolation => {
                    return Self::ConstraintViolation(err.to_string())
                }
                _ => {}
            }
        }
        Self::Database(err.to_string())
    }
}

/// A per-row rejection by the store: the row is skipped, the batch goes on.
pub(crate) fn is_row_rejection(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(ffi_err, _) if ffi_err.code == ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn busy_maps_to_store_unavailable() {
        let err: VaultError = sqlite_failure(rusqlite::ffi::SQLITE_BUSY).into();
        assert!(matches!(err, VaultError::StoreUnavailable(_)));
    }

    #[test]
    fn constraint_maps_to_constraint_violation() {
        let err: VaultError = sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).into();
        assert!(matches!(err, VaultError::ConstraintViolation(_)));
    }

    #[test]
    fn constraint_failure_is_a_row_rejection() {
        assert!(is_row_rejection(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT
        )));
        assert!(!is_row_rejection(&sqlite_failure(rusqlite::ffi::SQLITE_BUSY)));
        assert!(!is_row_rejection(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn other_errors_map_to_database() {
        let err: VaultError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, VaultError::Database(_)));
    }

    #[test]
    fn crypto_helpers_classify_errors() {
        assert!(VaultError::Crypto(CryptoError::Authentication).is_authentication_failure());
        assert!(VaultError::Crypto(CryptoError::ExpiredKey { deadline_ms: 1 }).is_expired_key());
        assert!(!VaultError::NotFound("a1".into()).is_expired_key());
    }
}
