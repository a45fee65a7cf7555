//! Crate-level error types for docreuse diagnostics.
use std::path::PathBuf;

/// Errors surfaced to callers. Per-file read failures, resolution cycles, and
/// malformed markup are not errors: they are logged and degrade the results.
#[allow(clippy::error_impl_error, reason = "crate-level error type")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The document a scan was requested for does not exist.
    #[error("document not found: {}", path.display())]
    DocumentNotFound {
        /// Path to the missing document.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization of command output failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// TOML deserialization of `.docreuse.toml` failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// The document extension maps to neither XML nor AsciiDoc.
    #[error("unsupported document type: {}", path.display())]
    UnsupportedDocument {
        /// Path whose extension was not recognized.
        path: PathBuf,
    },

    /// The filesystem watcher could not be created or attached.
    #[error("watcher setup failed: {reason}")]
    WatcherSetup {
        /// Description of the watcher failure.
        reason: String,
    },
}
