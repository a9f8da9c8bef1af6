//! # Pointer Model
//!
//! Pointers are small JSON documents that give symbolic names to blobs.
//! Two layers exist: tag pointers (`tags/{app}/{version}.json`) name a
//! concrete image blob, and environment pointers
//! (`pointers/{app}/{environment}.json`) name either a blob directly or a
//! tag pointer. The `target_type` field discriminates the two variants on
//! disk.
//!
//! Tag pointers reference images only at creation time, so the pointer
//! graph is a DAG of depth at most two. [`resolve_image_key`] nonetheless
//! dereferences tags iteratively up to a small bound, tolerating one level
//! of extra indirection rather than trusting every document in the bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::POINTER_MAX_DEPTH;
use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// Discriminator for what a pointer references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// `target_path` is an image blob key.
    Image,
    /// `target_path` is another pointer key (a tag pointer).
    Tag,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetType::Image => f.write_str("image"),
            TargetType::Tag => f.write_str("tag"),
        }
    }
}

/// On-disk pointer document, shared by tag and environment pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerMetadata {
    /// What `target_path` references.
    pub target_type: TargetType,
    /// Key of the referenced blob or tag pointer.
    pub target_path: String,
    /// Wall-clock time the pointer was written.
    pub promoted_at: DateTime<Utc>,
    /// OS username of the writer, or `"unknown"`.
    pub promoted_by: String,
    /// Abbreviated commit hash of the referenced build.
    pub git_hash: String,
    /// Committer timestamp of the referenced build.
    pub git_time: String,
    /// Original runtime reference, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_image: String,
    /// Source version for tag-variant pointers (e.g. `v1.2.0`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_tag: String,
}

impl PointerMetadata {
    /// Builds an image-variant pointer referencing a blob key.
    pub fn image(image_key: &str, git_hash: &str, git_time: &str, source_image: &str) -> Self {
        Self {
            target_type: TargetType::Image,
            target_path: image_key.to_string(),
            promoted_at: Utc::now(),
            promoted_by: current_user(),
            git_hash: git_hash.to_string(),
            git_time: git_time.to_string(),
            source_image: source_image.to_string(),
            source_tag: String::new(),
        }
    }

    /// Builds a tag-variant pointer referencing a tag pointer key.
    pub fn tag(
        tag_key: &str,
        git_hash: &str,
        git_time: &str,
        source_image: &str,
        source_tag: &str,
    ) -> Self {
        Self {
            target_type: TargetType::Tag,
            target_path: tag_key.to_string(),
            promoted_at: Utc::now(),
            promoted_by: current_user(),
            git_hash: git_hash.to_string(),
            git_time: git_time.to_string(),
            source_image: source_image.to_string(),
            source_tag: source_tag.to_string(),
        }
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses a pointer document.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Walks a pointer chain down to an image blob key.
///
/// Dereferences at most [`POINTER_MAX_DEPTH`] tag pointers before giving up
/// on the chain as malformed.
pub async fn resolve_image_key(
    store: &dyn ObjectStore,
    bucket: &str,
    pointer: &PointerMetadata,
) -> Result<String> {
    let mut current = pointer.clone();

    for _ in 0..POINTER_MAX_DEPTH {
        match current.target_type {
            TargetType::Image => return Ok(current.target_path),
            TargetType::Tag => {
                let data = store.download(bucket, &current.target_path).await?;
                current = PointerMetadata::from_json(&data)?;
            }
        }
    }

    Err(Error::PointerChainTooDeep(pointer.target_path.clone()))
}

/// Resolves the OS username, falling back to `"unknown"`.
fn current_user() -> String {
    whoami::fallible::username().unwrap_or_else(|_| "unknown".to_string())
}
