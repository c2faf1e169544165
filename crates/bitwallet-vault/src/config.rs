//! Store configuration, stored as plain JSON next to the database.
//!
//! Contains no secrets: file locations, key lifetime, KDF cost and log
//! settings. A missing or unreadable file yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use bitwallet_crypto_core::KdfParams;
use serde::{Deserialize, Serialize};

use crate::time::deadline_after_days;

const CONFIG_FILE: &str = "bitwallet.json";

/// Store-wide settings.
///
/// Persisted to `{data_dir}/bitwallet.json`. All fields have defaults via
/// [`Default`], so partial files load cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database file name, relative to the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Days a key stays active when sealed or rotated through
    /// [`crate::Store::store_secret_for_lifetime`] or
    /// [`crate::Store::rotate_key_for_lifetime`].
    #[serde(default = "default_key_lifetime_days")]
    pub key_lifetime_days: u32,

    /// Argon2id cost used by [`crate::Store::derive_store_key`].
    #[serde(default)]
    pub kdf: KdfParams,

    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Directory for daily-rolling log files. Logs go to stderr when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            key_lifetime_days: default_key_lifetime_days(),
            kdf: KdfParams::default(),
            log_filter: default_log_filter(),
            log_dir: None,
        }
    }
}

fn default_database_file() -> String {
    "bitwallet.db".into()
}
const fn default_key_lifetime_days() -> u32 {
    365
}
fn default_log_filter() -> String {
    "info".into()
}

impl StoreConfig {
    /// Load configuration from `{data_dir}/bitwallet.json`.
    ///
    /// Returns [`Default::default()`] when the file is missing or
    /// contains invalid JSON.
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| {
                serde_json::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                    Self::default()
                })
            },
        )
    }

    /// Persist configuration to `{data_dir}/bitwallet.json`.
    ///
    /// Writes to a `.tmp` file first, then renames over the target.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory does not exist or the
    /// file system rejects the write/rename.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let tmp = data_dir.join(".bitwallet.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;

        Ok(())
    }

    /// Full path of the database file.
    #[must_use]
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.database_file)
    }

    /// Deadline for a key sealed at `now_ms`.
    #[must_use]
    pub fn default_deadline(&self, now_ms: i64) -> i64 {
        deadline_after_days(now_ms, self.key_lifetime_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_values_are_correct() {
        let config = StoreConfig::default();
        assert_eq!(config.database_file, "bitwallet.db");
        assert_eq!(config.key_lifetime_days, 365);
        assert_eq!(config.kdf, KdfParams::default());
        assert_eq!(config.log_filter, "info");
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn load_returns_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(StoreConfig::load(dir.path()), StoreConfig::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            key_lifetime_days: 30,
            log_dir: Some(dir.path().join("logs")),
            ..StoreConfig::default()
        };

        config.save(dir.path()).unwrap();
        assert_eq!(StoreConfig::load(dir.path()), config);
    }

    #[test]
    fn load_recovers_from_corrupt_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert_eq!(StoreConfig::load(dir.path()), StoreConfig::default());
    }

    #[test]
    fn load_handles_partial_json_with_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"keyLifetimeDays":7,"kdf":{"mCost":1024,"tCost":2,"pCost":1}}"#,
        )
        .unwrap();

        let config = StoreConfig::load(dir.path());
        assert_eq!(config.key_lifetime_days, 7);
        assert_eq!(config.kdf.m_cost, 1024);
        assert_eq!(config.database_file, "bitwallet.db");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn save_is_atomic_via_tmp_file() {
        let dir = TempDir::new().unwrap();
        StoreConfig::default().save(dir.path()).unwrap();
        assert!(!dir.path().join(".bitwallet.json.tmp").exists());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        StoreConfig::default().save(dir.path()).unwrap();
        let mode = fs::metadata(dir.path().join(CONFIG_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn paths_and_deadlines_follow_settings() {
        let config = StoreConfig::default();
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/data/bitwallet.db")
        );
        assert_eq!(config.default_deadline(0), 365 * 86_400_000);
    }
}
