//! # Image Tagger
//!
//! Creates semantic version tag pointers (`tags/{app}/{version}.json`)
//! referencing an existing image blob. Tagging the same version again
//! silently overwrites the pointer.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLogger, StoreAuditLogger};
use crate::constants::YEAR_MONTH_FORMAT;
use crate::error::{Error, Result};
use crate::keys;
use crate::pointer::PointerMetadata;
use crate::store::ObjectStore;

/// Result of one tag operation.
#[derive(Debug, Clone, Serialize)]
pub struct TagOutcome {
    pub image_ref: String,
    pub version: String,
    pub s3_key: String,
}

/// Creates version tag pointers.
pub struct ImageTagger {
    store: Arc<dyn ObjectStore>,
    audit: StoreAuditLogger,
    bucket: String,
}

impl ImageTagger {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            store: store.clone(),
            audit: StoreAuditLogger::new(store, bucket.clone()),
            bucket,
        }
    }

    /// Tags `image_ref` as `version`.
    ///
    /// The blob key is reconstructed with the current month's partition, so
    /// the blob must have been pushed in the same month (see design notes).
    pub async fn tag(&self, image_ref: &str, version: &str) -> Result<TagOutcome> {
        let parsed = keys::parse_image_reference(image_ref)?;

        let year_month = Utc::now().format(YEAR_MONTH_FORMAT).to_string();
        let blob_key = keys::image_key(&parsed.app, &parsed.git_time, &parsed.git_hash, &year_month);
        debug!(%blob_key, "verifying image exists");

        if !self.store.exists(&self.bucket, &blob_key).await? {
            return Err(Error::ImageNotFound(blob_key));
        }

        let tag_key = keys::tag_key(&parsed.app, version);
        let pointer =
            PointerMetadata::image(&blob_key, &parsed.git_hash, &parsed.git_time, image_ref);

        self.store
            .upload(&self.bucket, &tag_key, pointer.to_json()?)
            .await?;

        info!(image_ref, version, %tag_key, "tagged image");

        let event = AuditEvent::tag(
            &parsed.app,
            &parsed.git_hash,
            &parsed.git_time,
            image_ref,
            version,
            &tag_key,
        );
        if let Err(e) = self.audit.log_event(&event).await {
            warn!("audit write failed (continuing): {e}");
        }

        Ok(TagOutcome {
            image_ref: image_ref.to_string(),
            version: version.to_string(),
            s3_key: tag_key,
        })
    }
}
