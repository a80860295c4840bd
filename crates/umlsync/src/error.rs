//! CLI error types.

use umlsync_config::ConfigError;
use umlsync_core::SyncError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Sync(#[from] SyncError),

    /// `check` found work for `sync` to do.
    #[error("{0} change(s) pending, run `umlsync sync`")]
    OutOfDate(usize),
}
