//! Error types for solrdump.

use thiserror::Error;

/// Result type alias for solrdump operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during export, import or config transfer.
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure, timeout or unexpected HTTP status from Solr.
    #[error("transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status code, if a response was received at all.
        status: Option<u16>,
        /// Short description, usually the response body excerpt.
        message: String,
    },

    /// Collection or config set does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication or authorization failure (401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A child document whose parent never appeared in the export stream.
    #[error("orphan child document '{id}': parent never seen in collection order")]
    OrphanChild {
        /// Identifier of the unattachable child document.
        id: String,
    },

    /// Config set overwrite blocked because collections still reference it.
    #[error("config set '{name}' is in use by collections: {}", collections.join(", "))]
    ConfigInUse {
        /// Name of the config set.
        name: String,
        /// Collections still referencing it.
        collections: Vec<String>,
    },

    /// Corrupt or unreadable archive on import.
    #[error("archive format error at line {line}: {message}")]
    ArchiveFormat {
        /// 1-based line number in the archive file.
        line: u64,
        /// What went wrong.
        message: String,
    },

    /// Invalid configuration or CLI arguments.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a transport error without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }
}
