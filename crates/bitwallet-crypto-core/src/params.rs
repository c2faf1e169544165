//! Cipher parameters persisted next to an encrypted secret.
//!
//! A [`CipherParams`] is the crypto-level view of a K record: everything
//! needed to open a ciphertext except the key itself, plus the deadline
//! after which the key must no longer be used.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::symmetric::{NONCE_LEN, TAG_LEN_BITS};

/// Derived expiry state of a key. Never stored; computed at every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    /// `now < deadline`.
    Active,
    /// `now >= deadline`. Decryption is refused.
    Expired,
}

impl KeyState {
    /// State of a key with `deadline_ms` at `now_ms`. The deadline instant
    /// itself counts as expired.
    #[must_use]
    pub const fn at(deadline_ms: i64, now_ms: i64) -> Self {
        if now_ms < deadline_ms {
            Self::Active
        } else {
            Self::Expired
        }
    }
}

/// Nonce, tag length and key deadline for one sealed secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    /// 96-bit nonce used when the secret was sealed.
    pub nonce: Vec<u8>,
    /// Authentication tag length in bits.
    pub tag_length_bits: u32,
    /// Key deadline, Unix epoch milliseconds.
    pub deadline_ms: i64,
}

impl CipherParams {
    /// Expiry state at `now_ms`. The deadline instant itself counts as expired.
    #[must_use]
    pub const fn state_at(&self, now_ms: i64) -> KeyState {
        KeyState::at(self.deadline_ms, now_ms)
    }

    /// Fail closed when the deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::ExpiredKey` if `now_ms >= deadline_ms`.
    pub const fn ensure_active(&self, now_ms: i64) -> Result<(), CryptoError> {
        match self.state_at(now_ms) {
            KeyState::Active => Ok(()),
            KeyState::Expired => Err(CryptoError::ExpiredKey {
                deadline_ms: self.deadline_ms,
            }),
        }
    }

    /// Check the parameter shape against AES-256-GCM.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidParameters` if the nonce is not 12 bytes
    /// or the tag length is not 128 bits.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidParameters(format!(
                "invalid nonce length: {} bytes (expected {NONCE_LEN})",
                self.nonce.len()
            )));
        }
        if self.tag_length_bits != TAG_LEN_BITS {
            return Err(CryptoError::InvalidParameters(format!(
                "unsupported tag length: {} bits (expected {TAG_LEN_BITS})",
                self.tag_length_bits
            )));
        }
        Ok(())
    }
}
