//! `tracing` subscriber setup for processes embedding the store.
//!
//! Log events never carry key material or plaintext; account ids are the
//! most sensitive field recorded.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::StoreConfig;
use crate::error::VaultError;

const LOG_FILE_PREFIX: &str = "bitwallet";

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` overrides `config.log_filter`. With `config.log_dir` set,
/// events go to a daily-rolling file through a non-blocking writer and the
/// returned guard must be kept alive to flush it; otherwise they go to
/// stderr. A second call leaves the first subscriber in place.
///
/// # Errors
///
/// Returns [`VaultError::Io`] if the log directory cannot be prepared.
pub fn init_logging(config: &StoreConfig) -> Result<Option<WorkerGuard>, VaultError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let Some(dir) = &config.log_dir else {
        let installed = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .with(filter)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!("logging to stderr");
        }
        return Ok(None);
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| VaultError::Io(std::io::Error::other(e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(dir = %dir.display(), "logging to rolling file");
        Ok(Some(guard))
    } else {
        Ok(None)
    }
}
