//! `bitwallet-crypto-core` — credential encryption primitives for BitWallet.
//!
//! This crate is the audit target: zero storage, zero async. Everything here
//! works on byte slices and fixed-size key material; persistence of the
//! resulting ciphertexts and cipher parameters lives in `bitwallet-vault`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod secret;

pub mod kdf;
pub mod params;
pub mod symmetric;

pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, KdfParams, SALT_LEN};
pub use params::{CipherParams, KeyState};
pub use secret::{RevealedSecret, SecretKey};
pub use symmetric::{
    decrypt, encrypt, SealedSecret, KEY_LEN, NONCE_LEN, TAG_LEN, TAG_LEN_BITS,
};
