//! # Image Pusher
//!
//! Orchestrates the push of one image: derive the content-addressed key
//! from VCS state, run the deterministic export pipeline, then decide
//! between three outcomes against the store:
//!
//! - **skip**: a sidecar already exists with the same checksum; nothing is
//!   uploaded, only an audit record is appended.
//! - **archive then replace**: a sidecar exists with a different checksum
//!   (a tainted workspace re-pushed the same commit); the old blob/sidecar
//!   pair is copied under `archive/` and deleted before the new pair is
//!   uploaded.
//! - **plain upload**: no sidecar exists yet.
//!
//! Any failure before the first upload leaves the store untouched. A
//! failure between archival and re-upload leaves the pair absent until the
//! same build is pushed again. Audit failures are logged, never fatal.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLogger, StoreAuditLogger};
use crate::constants::{GIT_TIME_FORMAT, YEAR_MONTH_FORMAT};
use crate::docker::ContainerRuntime;
use crate::error::{Error, Result};
use crate::git::VcsClient;
use crate::keys;
use crate::metadata::ImageMetadata;
use crate::progress::{self, Reporter};
use crate::store::ObjectStore;
use crate::tarball::{self, CompressedImage};

/// Result of one push.
#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    pub image_ref: String,
    pub s3_key: String,
    pub checksum: String,
    pub size: i64,
    pub skipped: bool,
    pub archived: bool,
}

/// Pushes images into the object store.
pub struct ImagePusher {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ObjectStore>,
    vcs: Arc<dyn VcsClient>,
    audit: StoreAuditLogger,
    bucket: String,
    reporter: Reporter,
}

impl ImagePusher {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ObjectStore>,
        vcs: Arc<dyn VcsClient>,
        bucket: impl Into<String>,
        reporter: Reporter,
    ) -> Self {
        let bucket = bucket.into();
        Self {
            runtime,
            store: store.clone(),
            vcs,
            audit: StoreAuditLogger::new(store, bucket.clone()),
            bucket,
            reporter,
        }
    }

    /// Pushes `image_ref`, deduplicating against the existing sidecar.
    pub async fn push(&self, image_ref: &str) -> Result<PushOutcome> {
        info!(image_ref, "pushing image");

        let (git_hash, git_time) = self.read_vcs_state().await?;
        let app = keys::extract_app_name(image_ref);
        let year_month = Utc::now().format(YEAR_MONTH_FORMAT).to_string();

        let blob_key = keys::image_key(&app, &git_time, &git_hash, &year_month);
        let sidecar_key = keys::metadata_key(&blob_key);
        debug!(%blob_key, %sidecar_key, %git_hash, %git_time, "derived keys");

        let sidecar_exists = self.store.exists(&self.bucket, &sidecar_key).await?;

        let compressed = self.export_compressed(image_ref, &git_time).await?;
        let metadata =
            ImageMetadata::for_compressed(&compressed, &git_hash, &git_time, image_ref, &app);
        debug!(
            checksum = %metadata.checksum,
            size = metadata.size,
            "image compressed"
        );

        let mut archived = false;
        if sidecar_exists {
            let existing_raw = self.store.download(&self.bucket, &sidecar_key).await?;
            let existing = ImageMetadata::from_json(&existing_raw)?;

            if existing.checksum == metadata.checksum {
                info!(image_ref, "image already stored with same checksum, skipping upload");
                self.log_push_audit(&app, &git_hash, &git_time, image_ref, &blob_key, &metadata, true, false)
                    .await;
                return Ok(PushOutcome {
                    image_ref: image_ref.to_string(),
                    s3_key: blob_key,
                    checksum: metadata.checksum,
                    size: metadata.size,
                    skipped: true,
                    archived: false,
                });
            }

            warn!(
                %blob_key,
                existing = %existing.checksum,
                new = %metadata.checksum,
                "checksum changed for existing key, archiving previous objects"
            );
            self.archive_existing(&blob_key, &sidecar_key).await?;
            archived = true;
        }

        self.store
            .upload_with_progress(
                &self.bucket,
                &blob_key,
                compressed.bytes,
                compressed.size,
                "Uploading image",
            )
            .await?;
        self.store
            .upload(&self.bucket, &sidecar_key, metadata.to_json()?)
            .await?;

        info!(
            image_ref,
            key = %blob_key,
            checksum = %metadata.checksum,
            "push complete"
        );
        self.log_push_audit(&app, &git_hash, &git_time, image_ref, &blob_key, &metadata, false, archived)
            .await;

        Ok(PushOutcome {
            image_ref: image_ref.to_string(),
            s3_key: blob_key,
            checksum: metadata.checksum,
            size: metadata.size,
            skipped: false,
            archived,
        })
    }

    /// Reads the commit hash and committer timestamp of the current repo.
    async fn read_vcs_state(&self) -> Result<(String, String)> {
        let vcs = self.vcs.clone();
        task::spawn_blocking(move || -> Result<(String, String)> {
            let repo = PathBuf::from(".");
            Ok((vcs.current_hash(&repo)?, vcs.commit_timestamp(&repo)?))
        })
        .await
        .map_err(|e| Error::Internal(format!("vcs task failed: {e}")))?
    }

    /// Runs export → normalize → gzip → tee on a blocking task.
    async fn export_compressed(&self, image_ref: &str, git_time: &str) -> Result<CompressedImage> {
        let fixed_time = tarball::parse_git_time(git_time)?;
        let runtime = self.runtime.clone();
        let reference = image_ref.to_string();

        let spinner = self.reporter.spinner("Exporting image...");
        let result = task::spawn_blocking(move || -> Result<CompressedImage> {
            let export = runtime.export(&reference)?;
            tarball::compress_export(export, fixed_time)
        })
        .await
        .map_err(|e| Error::Internal(format!("export task failed: {e}")))?;
        progress::finish(spinner);

        result
    }

    /// Moves the existing blob/sidecar pair out of the way under `archive/`.
    async fn archive_existing(&self, blob_key: &str, sidecar_key: &str) -> Result<()> {
        let timestamp = Utc::now().format(GIT_TIME_FORMAT).to_string();
        let (archive_blob, archive_sidecar) = keys::archive_keys(blob_key, &timestamp)?;
        debug!(%archive_blob, %archive_sidecar, "archiving replaced objects");

        self.store.copy(&self.bucket, blob_key, &archive_blob).await?;
        self.store
            .copy(&self.bucket, sidecar_key, &archive_sidecar)
            .await?;
        self.store.delete(&self.bucket, blob_key).await?;
        self.store.delete(&self.bucket, sidecar_key).await?;

        info!(%archive_blob, %archive_sidecar, "archived previous objects");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_push_audit(
        &self,
        app: &str,
        git_hash: &str,
        git_time: &str,
        image_ref: &str,
        blob_key: &str,
        metadata: &ImageMetadata,
        was_skipped: bool,
        was_archived: bool,
    ) {
        let event = AuditEvent::push(
            app,
            git_hash,
            git_time,
            image_ref,
            blob_key,
            &metadata.checksum,
            metadata.size,
            was_skipped,
            was_archived,
        );
        if let Err(e) = self.audit.log_event(&event).await {
            warn!("audit write failed (continuing): {e}");
        }
    }
}
