//! Cryptographic error types for `bitwallet-crypto-core`.

use thiserror::Error;

/// Errors produced by credential encryption operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Stored cipher parameters are malformed (nonce length, tag length).
    #[error("invalid cipher parameters: {0}")]
    InvalidParameters(String),

    /// AES-256-GCM sealing failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed: ciphertext tampered, or the
    /// key, nonce, or bound account do not match.
    ///
    /// Carries no detail; every verification failure looks the same.
    #[error("decryption failed: authentication tag mismatch")]
    Authentication,

    /// The key deadline has passed; decryption was refused without being attempted.
    #[error("key expired at {deadline_ms} ms since the Unix epoch")]
    ExpiredKey {
        /// Deadline recorded in the cipher parameters (Unix epoch milliseconds).
        deadline_ms: i64,
    },

    /// Passphrase key derivation failed (Argon2id parameter validation, memory allocation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// CSPRNG failure while generating key material.
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
