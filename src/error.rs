//! Error types for s3dock operations.

/// Result type alias for s3dock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while distributing images through the object store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file or profile resolution failed.
    #[error("configuration error: {0}")]
    Config(String),

    // =========================================================================
    // VCS Errors
    // =========================================================================
    /// Git repository access failed.
    #[error("git error: {0}")]
    Vcs(String),

    /// Repository has uncommitted changes.
    #[error("repository has uncommitted changes - commit all changes before building")]
    DirtyRepository,

    // =========================================================================
    // Parse Errors
    // =========================================================================
    /// Image reference does not match `{app}:{gitTime}-{gitHash}`.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    /// Blob key cannot be mapped back to an image reference.
    #[error("invalid image key '{key}': {reason}")]
    InvalidImageKey { key: String, reason: String },

    /// Git timestamp string does not match `YYYYMMDD-HHMM`.
    #[error("invalid git time format '{0}'")]
    InvalidGitTime(String),

    // =========================================================================
    // Not-Found Errors
    // =========================================================================
    /// Image blob absent where required.
    #[error("image not found in bucket: {0}")]
    ImageNotFound(String),

    /// Tag pointer absent.
    #[error("tag not found: {0}")]
    TagNotFound(String),

    /// Environment pointer absent.
    #[error("environment pointer not found: {0}")]
    PointerNotFound(String),

    /// Pointer chain exceeded the resolution depth bound.
    #[error("pointer chain too deep while resolving {0}")]
    PointerChainTooDeep(String),

    // =========================================================================
    // Transfer Errors
    // =========================================================================
    /// Object store transport or permission failure.
    #[error("object store error: {0}")]
    Store(String),

    /// Downloaded bytes do not hash to the sidecar checksum.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Download retry budget exhausted.
    #[error("download failed after {attempts} attempts: {reason}")]
    DownloadFailed { attempts: u32, reason: String },

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Container runtime invocation failed.
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Image export failed.
    #[error("failed to export image '{reference}': {reason}")]
    ExportFailed { reference: String, reason: String },

    /// The runtime refused the decompressed tar.
    #[error("failed to import image: {0}")]
    ImportFailed(String),

    /// Image build failed.
    #[error("failed to build image '{tag}': {reason}")]
    BuildFailed { tag: String, reason: String },

    // =========================================================================
    // Audit Errors
    // =========================================================================
    /// Audit record could not be written.
    #[error("failed to write audit event: {0}")]
    Audit(String),

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::Vcs(err.message().to_string())
    }
}
