//! # Image Puller
//!
//! Resolves an environment or version tag down to a blob, streams the blob
//! into a temporary file with checksum verification, and hands the
//! decompressed tar to the container runtime.
//!
//! ## Verification and retries
//!
//! The sidecar's MD5 is the source of truth. Each attempt truncates the
//! temp file, re-downloads, and re-hashes; up to three attempts are made
//! with a short fixed delay, after which the pull fails. Only this path
//! retries; push and promote leave retrying to the caller.
//!
//! ## Short-circuit
//!
//! When the runtime already holds `{app}:{gitTime}-{gitHash}` (derived from
//! the resolved blob key), neither download nor import happens.
//!
//! The temp file is removed on every exit path, including errors.

use std::sync::Arc;

use flate2::read::GzDecoder;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task;
use tracing::{debug, info, warn};

use crate::constants::{PULL_MAX_ATTEMPTS, PULL_RETRY_DELAY};
use crate::docker::ContainerRuntime;
use crate::error::{Error, Result};
use crate::keys;
use crate::metadata::ImageMetadata;
use crate::pointer::{self, PointerMetadata};
use crate::progress::{self, Reporter};
use crate::store::ObjectStore;
use crate::tarball;

/// Result of one pull.
#[derive(Debug, Clone, Serialize)]
pub struct PullOutcome {
    pub image_ref: String,
    pub source: String,
    /// `"environment"` or `"tag"`.
    pub source_type: String,
    pub skipped: bool,
}

/// Pulls images out of the object store into the local runtime.
pub struct ImagePuller {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    reporter: Reporter,
}

impl ImagePuller {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        reporter: Reporter,
    ) -> Self {
        Self {
            runtime,
            store,
            bucket: bucket.into(),
            reporter,
        }
    }

    /// Pulls whatever an environment currently points at.
    pub async fn pull(&self, app: &str, environment: &str) -> Result<PullOutcome> {
        info!(app, environment, "pulling from environment");

        let env_key = keys::pointer_key(app, environment);
        if !self.store.exists(&self.bucket, &env_key).await? {
            return Err(Error::PointerNotFound(format!("{app}/{environment}")));
        }

        let raw = self.store.download(&self.bucket, &env_key).await?;
        let env_pointer = PointerMetadata::from_json(&raw)?;
        debug!(
            target_type = %env_pointer.target_type,
            target = %env_pointer.target_path,
            "resolved environment pointer"
        );

        let blob_key =
            pointer::resolve_image_key(self.store.as_ref(), &self.bucket, &env_pointer).await?;
        self.fetch_and_import(environment, "environment", &blob_key)
            .await
    }

    /// Pulls the image a version tag points at.
    pub async fn pull_from_tag(&self, app: &str, version: &str) -> Result<PullOutcome> {
        info!(app, version, "pulling from tag");

        let tag_key = keys::tag_key(app, version);
        if !self.store.exists(&self.bucket, &tag_key).await? {
            return Err(Error::TagNotFound(format!("{app}/{version}")));
        }

        let raw = self.store.download(&self.bucket, &tag_key).await?;
        let tag_pointer = PointerMetadata::from_json(&raw)?;

        let blob_key =
            pointer::resolve_image_key(self.store.as_ref(), &self.bucket, &tag_pointer).await?;
        self.fetch_and_import(version, "tag", &blob_key).await
    }

    /// Downloads, verifies, and imports one blob.
    async fn fetch_and_import(
        &self,
        source: &str,
        source_type: &str,
        blob_key: &str,
    ) -> Result<PullOutcome> {
        let image_ref = keys::image_ref_from_key(blob_key)?;

        if self.runtime_has(&image_ref).await? {
            info!(%image_ref, "image already present in runtime, skipping download");
            return Ok(PullOutcome {
                image_ref,
                source: source.to_string(),
                source_type: source_type.to_string(),
                skipped: true,
            });
        }

        let sidecar_raw = self
            .store
            .download(&self.bucket, &keys::metadata_key(blob_key))
            .await?;
        let sidecar = ImageMetadata::from_json(&sidecar_raw)?;
        debug!(size = sidecar.size, checksum = %sidecar.checksum, "sidecar read");

        // NamedTempFile removes itself on drop, covering every exit path.
        let temp = tempfile::Builder::new()
            .prefix("s3dock-pull-")
            .suffix(".tar.gz")
            .tempfile()?;
        let temp_path = temp.path().to_path_buf();

        let mut last_error: Option<Error> = None;
        let mut verified = false;

        for attempt in 1..=PULL_MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(PULL_RETRY_DELAY).await;
            }
            info!(attempt, max = PULL_MAX_ATTEMPTS, "downloading image");

            if let Err(e) = self.download_once(blob_key, &temp_path, sidecar.size).await {
                warn!(attempt, "download failed: {e}");
                last_error = Some(e);
                continue;
            }

            let hash_path = temp_path.clone();
            let actual = task::spawn_blocking(move || tarball::checksum_file(&hash_path))
                .await
                .map_err(|e| Error::Internal(format!("checksum task failed: {e}")))??;

            if actual == sidecar.checksum {
                info!(checksum = %actual, "checksum verified");
                verified = true;
                break;
            }

            warn!(
                attempt,
                expected = %sidecar.checksum,
                %actual,
                "checksum mismatch, retrying"
            );
            last_error = Some(Error::ChecksumMismatch {
                expected: sidecar.checksum.clone(),
                actual,
            });
        }

        if !verified {
            return Err(Error::DownloadFailed {
                attempts: PULL_MAX_ATTEMPTS,
                reason: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        self.import_from(&temp_path).await?;

        info!(%image_ref, source, "pull complete");
        Ok(PullOutcome {
            image_ref,
            source: source.to_string(),
            source_type: source_type.to_string(),
            skipped: false,
        })
    }

    /// One streamed download of the blob into the temp file, truncating any
    /// previous attempt's bytes.
    async fn download_once(
        &self,
        blob_key: &str,
        path: &std::path::Path,
        expected_size: i64,
    ) -> Result<()> {
        let mut stream = self.store.download_stream(&self.bucket, blob_key).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let bar = self.reporter.bytes(expected_size, "Downloading image");

        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            if let Some(bar) = &bar {
                bar.inc(n as u64);
            }
        }

        file.flush().await?;
        progress::finish(bar);
        Ok(())
    }

    /// Decompresses the verified temp file and feeds it to the runtime.
    async fn import_from(&self, path: &std::path::Path) -> Result<()> {
        let runtime = self.runtime.clone();
        let path = path.to_path_buf();

        let spinner = self.reporter.spinner("Importing image...");
        let result = task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::open(&path)?;
            let mut decoder = GzDecoder::new(std::io::BufReader::new(file));
            runtime
                .import(&mut decoder)
                .map_err(|e| Error::ImportFailed(e.to_string()))
        })
        .await
        .map_err(|e| Error::Internal(format!("import task failed: {e}")))?;
        progress::finish(spinner);

        result
    }

    async fn runtime_has(&self, image_ref: &str) -> Result<bool> {
        let runtime = self.runtime.clone();
        let reference = image_ref.to_string();
        task::spawn_blocking(move || runtime.exists(&reference))
            .await
            .map_err(|e| Error::Internal(format!("runtime task failed: {e}")))?
    }
}
