#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for account-secret sealing.

use bitwallet_crypto_core::symmetric::{decrypt, encrypt, KEY_LEN};
use bitwallet_crypto_core::CryptoError;
use proptest::prelude::*;

/// Fixed key for property tests.
const PROP_KEY: [u8; KEY_LEN] = [0xCC; KEY_LEN];

const NOW: i64 = 1_760_000_000_000;

proptest! {
    /// Encrypt→decrypt always recovers the original plaintext.
    #[test]
    fn encrypt_decrypt_roundtrip(
        plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
        account_id in "[a-z0-9]{1,24}",
        ttl_ms in 1i64..31_536_000_000,
    ) {
        let sealed = encrypt(&plaintext, &PROP_KEY, account_id.as_bytes()).unwrap();
        let params = sealed.params(NOW + ttl_ms);
        let opened = decrypt(&sealed.ciphertext, &PROP_KEY, &params, account_id.as_bytes(), NOW)
            .unwrap();
        prop_assert_eq!(opened.expose(), plaintext.as_slice());
    }

    /// Flipping any single bit of ciphertext or tag yields `Authentication`,
    /// never a different plaintext.
    #[test]
    fn any_bit_flip_fails_authentication(
        plaintext in proptest::collection::vec(any::<u8>(), 0..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let sealed = encrypt(&plaintext, &PROP_KEY, b"a1").unwrap();
        let params = sealed.params(NOW + 1_000);
        let mut tampered = sealed.ciphertext.clone();
        let idx = position.index(tampered.len());
        tampered[idx] ^= 1u8 << bit;

        let result = decrypt(&tampered, &PROP_KEY, &params, b"a1", NOW);
        prop_assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    /// Once the deadline has passed, decryption is refused even with every
    /// input correct.
    #[test]
    fn expired_deadline_always_refuses(
        plaintext in proptest::collection::vec(any::<u8>(), 0..256),
        overdue_ms in 0i64..31_536_000_000,
    ) {
        let sealed = encrypt(&plaintext, &PROP_KEY, b"a1").unwrap();
        let params = sealed.params(NOW - overdue_ms);
        let result = decrypt(&sealed.ciphertext, &PROP_KEY, &params, b"a1", NOW);
        prop_assert!(
            matches!(result, Err(CryptoError::ExpiredKey { .. })),
            "expected ExpiredKey"
        );
    }
}
