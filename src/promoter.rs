//! # Image Promoter
//!
//! Creates or updates environment pointers
//! (`pointers/{app}/{environment}.json`). A promotion can reference an
//! image directly (`promote myapp:20250721-2118-f7a5a27 production`) or go
//! through a version tag (`promote myapp v1.2.0 production`), in which case
//! the environment pointer targets the *tag pointer key* and follows any
//! later retag of that version.
//!
//! Promotion is idempotent: when the new target equals the existing
//! pointer's target, nothing is written and no audit record is appended.
//! Unlike push and tag, a failed audit write fails the promotion.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditLogger, StoreAuditLogger};
use crate::constants::YEAR_MONTH_FORMAT;
use crate::error::{Error, Result};
use crate::keys;
use crate::pointer::PointerMetadata;
use crate::store::ObjectStore;

/// Result of one promotion.
#[derive(Debug, Clone, Serialize)]
pub struct PromoteOutcome {
    pub source: String,
    pub environment: String,
    /// `"image"` or `"tag"`.
    pub source_type: String,
    pub skipped: bool,
}

/// Promotes images or tags to environments.
pub struct ImagePromoter {
    store: Arc<dyn ObjectStore>,
    audit: StoreAuditLogger,
    bucket: String,
}

impl ImagePromoter {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            store: store.clone(),
            audit: StoreAuditLogger::new(store, bucket.clone()),
            bucket,
        }
    }

    /// Promotes a concrete image reference to an environment.
    pub async fn promote(&self, source: &str, environment: &str) -> Result<PromoteOutcome> {
        let parsed = keys::parse_image_reference(source)?;

        let year_month = Utc::now().format(YEAR_MONTH_FORMAT).to_string();
        let blob_key = keys::image_key(&parsed.app, &parsed.git_time, &parsed.git_hash, &year_month);
        debug!(%blob_key, "verifying image exists");

        if !self.store.exists(&self.bucket, &blob_key).await? {
            return Err(Error::ImageNotFound(blob_key));
        }

        let pointer =
            PointerMetadata::image(&blob_key, &parsed.git_hash, &parsed.git_time, source);

        self.write_environment_pointer(&parsed.app, environment, source, "image", pointer)
            .await
    }

    /// Promotes an existing version tag to an environment. The environment
    /// pointer targets the tag pointer itself.
    pub async fn promote_from_tag(
        &self,
        app: &str,
        version: &str,
        environment: &str,
    ) -> Result<PromoteOutcome> {
        let tag_key = keys::tag_key(app, version);

        if !self.store.exists(&self.bucket, &tag_key).await? {
            return Err(Error::TagNotFound(format!("{app}/{version}")));
        }

        let tag_raw = self.store.download(&self.bucket, &tag_key).await?;
        let tag_pointer = PointerMetadata::from_json(&tag_raw)?;

        let pointer = PointerMetadata::tag(
            &tag_key,
            &tag_pointer.git_hash,
            &tag_pointer.git_time,
            &tag_pointer.source_image,
            version,
        );

        let source = format!("{app}:{version}");
        self.write_environment_pointer(app, environment, &source, "tag", pointer)
            .await
    }

    /// Shared tail of both promotion paths: fetch the existing pointer,
    /// short-circuit when the target is unchanged, otherwise overwrite and
    /// audit with the previous target recorded.
    async fn write_environment_pointer(
        &self,
        app: &str,
        environment: &str,
        source: &str,
        source_type: &str,
        pointer: PointerMetadata,
    ) -> Result<PromoteOutcome> {
        let env_key = keys::pointer_key(app, environment);

        let previous_target = match self.existing_target(&env_key).await {
            Some(target) if target == pointer.target_path => {
                info!(
                    environment,
                    target = target.as_str(),
                    "environment already points at target, skipping promotion"
                );
                return Ok(PromoteOutcome {
                    source: source.to_string(),
                    environment: environment.to_string(),
                    source_type: source_type.to_string(),
                    skipped: true,
                });
            }
            Some(target) => target,
            None => String::new(),
        };

        self.store
            .upload(&self.bucket, &env_key, pointer.to_json()?)
            .await?;

        info!(source, environment, %env_key, "promoted");

        let event = AuditEvent::promotion(
            app,
            &pointer.git_hash,
            &pointer.git_time,
            environment,
            source,
            source_type,
            &env_key,
            &previous_target,
        );
        // Promotion treats an unrecorded audit trail as a failure.
        self.audit.log_event(&event).await?;

        Ok(PromoteOutcome {
            source: source.to_string(),
            environment: environment.to_string(),
            source_type: source_type.to_string(),
            skipped: false,
        })
    }

    /// Target path of the current environment pointer, if one exists and
    /// parses. Best-effort: unreadable pointers are treated as absent.
    async fn existing_target(&self, env_key: &str) -> Option<String> {
        match self.store.exists(&self.bucket, env_key).await {
            Ok(true) => {}
            _ => return None,
        }
        let raw = self.store.download(&self.bucket, env_key).await.ok()?;
        let existing = PointerMetadata::from_json(&raw).ok()?;
        Some(existing.target_path)
    }
}
