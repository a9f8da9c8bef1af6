//! Constants for the distribution layer.
//!
//! All prefixes, formats, and limits are defined here to ensure
//! consistency and prevent magic strings throughout the codebase.

use std::time::Duration;

// =============================================================================
// Object Store Layout
// =============================================================================

/// Key prefix for image blobs and their metadata sidecars.
pub const IMAGES_PREFIX: &str = "images/";

/// Key prefix for semantic version tag pointers.
pub const TAGS_PREFIX: &str = "tags/";

/// Key prefix for environment pointers.
pub const POINTERS_PREFIX: &str = "pointers/";

/// Key prefix for audit records.
pub const AUDIT_PREFIX: &str = "audit/";

/// Key prefix for archived blob/sidecar pairs.
pub const ARCHIVE_PREFIX: &str = "archive/";

/// File extension of image blobs.
pub const BLOB_SUFFIX: &str = ".tar.gz";

/// File extension of metadata sidecars and pointers.
pub const JSON_SUFFIX: &str = ".json";

// =============================================================================
// Timestamp Formats
// =============================================================================

/// chrono format for git committer timestamps (`20250721-2118`).
pub const GIT_TIME_FORMAT: &str = "%Y%m%d-%H%M";

/// chrono format for monthly key partitions (`202507`).
pub const YEAR_MONTH_FORMAT: &str = "%Y%m";

/// Length of a formatted git timestamp.
pub const GIT_TIME_LEN: usize = 13;

/// Index of the dash inside a formatted git timestamp.
pub const GIT_TIME_DASH_INDEX: usize = 8;

// =============================================================================
// Validation Limits
// =============================================================================

/// Minimum accepted length of an abbreviated commit hash.
pub const MIN_HASH_LEN: usize = 5;

/// Number of hex characters taken from a full commit id.
pub const SHORT_HASH_LEN: usize = 7;

/// Maximum tag indirection depth tolerated during pointer resolution.
/// The pointer graph is a DAG of depth at most two; the bound guards
/// against malformed chains.
pub const POINTER_MAX_DEPTH: usize = 4;

// =============================================================================
// Retry Discipline
// =============================================================================

/// Download attempts before a pull fails.
pub const PULL_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between pull download attempts.
pub const PULL_RETRY_DELAY: Duration = Duration::from_secs(2);

// =============================================================================
// Defaults
// =============================================================================

/// Bucket used when neither config, environment, nor flags name one.
pub const DEFAULT_BUCKET: &str = "s3dock-containers";

/// Region used when neither config nor environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";
