//! Error taxonomy for the sync engine.
//!
//! Startup errors are fatal; anything raised while handling a single watch
//! event is reported and the loop moves on.

use std::path::PathBuf;

use thiserror::Error;

/// All failure modes surfaced by devloop-core.
#[derive(Error, Debug)]
pub enum DevloopError {
    /// The device did not answer, or answered with something that is not a
    /// config object. Fatal during startup, skippable mid-loop.
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    /// A single remote call failed (transport error or non-JSON reply).
    #[error("remote call {method} failed: {reason}")]
    RemoteCall { method: String, reason: String },

    /// The local config mirror is not valid JSON; the upload is aborted.
    #[error("malformed config at {}: {source}", path.display())]
    MalformedConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A console or log-receiver subordinate misbehaved.
    #[error("subordinate process: {0}")]
    Subordinate(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem watcher error
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, DevloopError>;
