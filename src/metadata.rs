//! Image metadata sidecar.
//!
//! Every blob in the store is paired with a JSON sidecar sharing its stem.
//! The sidecar carries the blob's MD5 and size (the dedup/verification
//! anchor) plus build provenance. Field names are part of the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tarball::CompressedImage;

/// Sidecar document describing one stored image blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Hex MD5 of the gzipped blob bytes.
    pub checksum: String,
    /// Blob length in bytes.
    pub size: i64,
    /// Wall-clock time of the push.
    pub created_at: DateTime<Utc>,
    /// Abbreviated commit hash the image was built from.
    pub git_hash: String,
    /// Committer timestamp, `YYYYMMDD-HHMM`.
    pub git_time: String,
    /// Original runtime reference the blob was exported from.
    pub image_tag: String,
    /// Application name.
    pub app_name: String,
}

impl ImageMetadata {
    /// Builds the sidecar for a freshly compressed image.
    pub fn for_compressed(
        compressed: &CompressedImage,
        git_hash: &str,
        git_time: &str,
        image_tag: &str,
        app_name: &str,
    ) -> Self {
        Self {
            checksum: compressed.checksum.clone(),
            size: compressed.size,
            created_at: Utc::now(),
            git_hash: git_hash.to_string(),
            git_time: git_time.to_string(),
            image_tag: image_tag.to_string(),
            app_name: app_name.to_string(),
        }
    }

    /// Serializes to pretty-printed JSON for human inspection in the store.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses a sidecar document.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
