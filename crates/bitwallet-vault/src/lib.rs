//! `bitwallet-vault` — account storage for BitWallet.
//!
//! Persists the directory tree, accounts with their sealed secret, and the
//! cipher parameters (K records) needed to open them, in `SQLite`. Keys are
//! never stored; callers pass them in or derive them from a passphrase.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod accounts;
pub mod cipher_params;
pub mod config;
pub mod db;
pub mod directories;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod logging;
pub mod master_key;
pub mod repository;
pub mod time;

pub use accounts::{Account, AccountFilter, Accounts, NewAccount, SealedAccount};
pub use cipher_params::{KFilter, KRecord, KRecords, NewKRecord};
pub use config::StoreConfig;
pub use db::StoreDb;
pub use directories::{
    root_directory, Directories, Directory, DirectoryFilter, NewDirectory, ROOT_DIRECTORY_NAME,
};
pub use error::VaultError;
pub use gateway::Store;
pub use keys::{extend_deadline, key_state, reveal_secret, rotate, seal_account};
pub use logging::init_logging;
pub use master_key::derive_master_key;
pub use repository::{BatchOutcome, Repository};

pub use bitwallet_crypto_core::{CryptoError, KdfParams, KeyState, RevealedSecret, SecretKey};
