//! AES-256-GCM sealing of account secrets.
//!
//! This module provides:
//! - [`encrypt`] — seal a plaintext under a random 96-bit nonce, returning [`SealedSecret`]
//! - [`decrypt`] — check key expiry, then authenticate and open a ciphertext
//!
//! The stored ciphertext layout is `ciphertext || tag`. The nonce and tag
//! length travel separately, in the account's K record, together with the
//! key deadline.

use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::params::CipherParams;
use crate::secret::RevealedSecret;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Authentication tag length in bits, as recorded in K records.
pub const TAG_LEN_BITS: u32 = 128;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Output of [`encrypt`]: what goes into the account row and its K record.
#[must_use = "a sealed secret must be persisted or it is lost"]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedSecret {
    /// `ciphertext || tag`.
    pub ciphertext: Vec<u8>,
    /// Random nonce, unique per call.
    pub nonce: [u8; NONCE_LEN],
    /// Tag length in bits (always [`TAG_LEN_BITS`]).
    pub tag_length_bits: u32,
}

impl SealedSecret {
    /// Build the [`CipherParams`] to persist for this ciphertext.
    #[must_use]
    pub fn params(&self, deadline_ms: i64) -> CipherParams {
        CipherParams {
            nonce: self.nonce.to_vec(),
            tag_length_bits: self.tag_length_bits,
            deadline_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Core encryption
// ---------------------------------------------------------------------------

fn less_safe_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::InvalidKeyMaterial("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// `aad` is authenticated but not encrypted; BitWallet binds the owning
/// account id here so a ciphertext cannot be replayed onto another account.
///
/// # Errors
///
/// - `CryptoError::InvalidKeyMaterial` if the key is not exactly 32 bytes
/// - `CryptoError::SecureMemory` if the CSPRNG fails
/// - `CryptoError::Encryption` if sealing fails
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<SealedSecret, CryptoError> {
    let key = less_safe_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = Vec::with_capacity(plaintext.len().saturating_add(TAG_LEN));
    in_out.extend_from_slice(plaintext);
    if key
        .seal_in_place_append_tag(nonce, aead::Aad::from(aad), &mut in_out)
        .is_err()
    {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    }

    Ok(SealedSecret {
        ciphertext: in_out,
        nonce: nonce_bytes,
        tag_length_bits: TAG_LEN_BITS,
    })
}

/// Open a ciphertext produced by [`encrypt`].
///
/// The key deadline is checked before anything else: an expired key is
/// never used, even when the tag would verify.
///
/// # Errors
///
/// - `CryptoError::ExpiredKey` if `now_ms >= params.deadline_ms`
/// - `CryptoError::InvalidKeyMaterial` if the key is not exactly 32 bytes
/// - `CryptoError::InvalidParameters` if the nonce or tag length is malformed
/// - `CryptoError::Authentication` for every verification failure
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    params: &CipherParams,
    aad: &[u8],
    now_ms: i64,
) -> Result<RevealedSecret, CryptoError> {
    params.ensure_active(now_ms)?;
    let key = less_safe_key(key)?;
    params.validate()?;

    let nonce = aead::Nonce::try_assume_unique_for_key(&params.nonce)
        .map_err(|_| CryptoError::InvalidParameters("malformed nonce".into()))?;

    let mut in_out = ciphertext.to_vec();
    let result = key
        .open_in_place(nonce, aead::Aad::from(aad), &mut in_out)
        .map(|plaintext| RevealedSecret::new(plaintext))
        .map_err(|_| CryptoError::Authentication);
    in_out.zeroize();
    result
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::KeyState;

    const TEST_KEY: [u8; KEY_LEN] = [0xAA; KEY_LEN];
    const WRONG_KEY: [u8; KEY_LEN] = [0xBB; KEY_LEN];
    const AAD: &[u8] = b"account:a1";

    const NOW: i64 = 1_700_000_000_000;
    const FUTURE: i64 = NOW + 86_400_000;

    #[test]
    fn encrypt_produces_expected_lengths() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).expect("encrypt should succeed");
        assert_eq!(sealed.nonce.len(), NONCE_LEN);
        assert_eq!(sealed.tag_length_bits, 128);
        assert_eq!(sealed.ciphertext.len(), b"hunter2".len() + TAG_LEN);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let params = sealed.params(FUTURE);
        let opened = decrypt(&sealed.ciphertext, &TEST_KEY, &params, AAD, NOW).unwrap();
        assert_eq!(opened.expose(), b"hunter2");
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let sealed = encrypt(&[], &TEST_KEY, AAD).unwrap();
        assert_eq!(sealed.ciphertext.len(), TAG_LEN);
        let opened = decrypt(&sealed.ciphertext, &TEST_KEY, &sealed.params(FUTURE), AAD, NOW)
            .unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn two_encrypts_use_different_nonces() {
        let a = encrypt(b"same", &TEST_KEY, AAD).unwrap();
        let b = encrypt(b"same", &TEST_KEY, AAD).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn encrypt_rejects_short_key() {
        let result = encrypt(b"x", &[0u8; 31], AAD);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn decrypt_rejects_long_key() {
        let sealed = encrypt(b"x", &TEST_KEY, AAD).unwrap();
        let result = decrypt(&sealed.ciphertext, &[0u8; 33], &sealed.params(FUTURE), AAD, NOW);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn decrypt_with_wrong_key_fails_authentication() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let result = decrypt(&sealed.ciphertext, &WRONG_KEY, &sealed.params(FUTURE), AAD, NOW);
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn decrypt_with_wrong_aad_fails_authentication() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let result = decrypt(
            &sealed.ciphertext,
            &TEST_KEY,
            &sealed.params(FUTURE),
            b"account:a2",
            NOW,
        );
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn decrypt_with_modified_nonce_fails_authentication() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let mut params = sealed.params(FUTURE);
        params.nonce[0] ^= 0x01;
        let result = decrypt(&sealed.ciphertext, &TEST_KEY, &params, AAD, NOW);
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn decrypt_tampered_tag_fails_authentication() {
        let mut sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0x80;
        let result = decrypt(&sealed.ciphertext, &TEST_KEY, &sealed.params(FUTURE), AAD, NOW);
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn truncated_ciphertext_fails_authentication() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let params = sealed.params(FUTURE);
        for len in [0, 1, TAG_LEN - 1] {
            let result = decrypt(&sealed.ciphertext[..len], &TEST_KEY, &params, AAD, NOW);
            assert!(
                matches!(result, Err(CryptoError::Authentication)),
                "{len}-byte ciphertext should fail authentication"
            );
        }
    }

    #[test]
    fn expired_key_is_refused_even_when_everything_matches() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let params = sealed.params(NOW - 1);
        assert_eq!(params.state_at(NOW), KeyState::Expired);
        let result = decrypt(&sealed.ciphertext, &TEST_KEY, &params, AAD, NOW);
        assert!(matches!(
            result,
            Err(CryptoError::ExpiredKey { deadline_ms }) if deadline_ms == NOW - 1
        ));
    }

    #[test]
    fn expiry_is_checked_before_key_length() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let result = decrypt(&sealed.ciphertext, &[0u8; 3], &sealed.params(NOW), AAD, NOW);
        assert!(matches!(result, Err(CryptoError::ExpiredKey { .. })));
    }

    #[test]
    fn malformed_nonce_is_invalid_parameters() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let mut params = sealed.params(FUTURE);
        params.nonce.push(0);
        let result = decrypt(&sealed.ciphertext, &TEST_KEY, &params, AAD, NOW);
        assert!(matches!(result, Err(CryptoError::InvalidParameters(_))));
    }

    #[test]
    fn unsupported_tag_length_is_invalid_parameters() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let mut params = sealed.params(FUTURE);
        params.tag_length_bits = 64;
        let result = decrypt(&sealed.ciphertext, &TEST_KEY, &params, AAD, NOW);
        assert!(matches!(result, Err(CryptoError::InvalidParameters(_))));
    }

    #[test]
    fn sealed_params_carry_nonce_and_deadline() {
        let sealed = encrypt(b"hunter2", &TEST_KEY, AAD).unwrap();
        let params = sealed.params(FUTURE);
        assert_eq!(params.nonce, sealed.nonce.to_vec());
        assert_eq!(params.tag_length_bits, TAG_LEN_BITS);
        assert_eq!(params.deadline_ms, FUTURE);
    }
}
