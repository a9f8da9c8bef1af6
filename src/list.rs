//! # List Service
//!
//! Read-only projections over the pointer tree: prefix scans followed by
//! parse-and-project. Listing is best-effort: keys that fail to download
//! or parse are skipped rather than failing the whole listing.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::constants::{BLOB_SUFFIX, IMAGES_PREFIX, JSON_SUFFIX, POINTERS_PREFIX, TAGS_PREFIX};
use crate::error::{Error, Result};
use crate::keys;
use crate::pointer::{PointerMetadata, TargetType};
use crate::store::ObjectStore;

/// One stored image, as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub app_name: String,
    /// `{gitTime}-{gitHash}` portion of the blob filename.
    pub tag: String,
    pub s3_path: String,
    pub year_month: String,
}

/// One version tag, as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEntry {
    pub app_name: String,
    pub version: String,
    pub target_image: String,
    pub s3_path: String,
}

/// One environment pointer, as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvEntry {
    pub app_name: String,
    pub environment: String,
    pub target_type: TargetType,
    pub target_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_tag: String,
    pub source_image: String,
}

/// Read-only queries over the store layout.
pub struct ListService {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ListService {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Lists images for an app, optionally restricted to one `YYYYMM`
    /// partition, newest first.
    pub async fn list_images(
        &self,
        app: &str,
        year_month: Option<&str>,
    ) -> Result<Vec<ImageEntry>> {
        let prefix = match year_month {
            Some(ym) => format!("{IMAGES_PREFIX}{app}/{ym}/"),
            None => format!("{IMAGES_PREFIX}{app}/"),
        };
        debug!(%prefix, "listing images");

        let keys = self.store.list(&self.bucket, &prefix).await?;
        let mut images: Vec<ImageEntry> = keys
            .iter()
            .filter(|key| key.ends_with(BLOB_SUFFIX))
            .filter_map(|key| parse_image_entry(key).ok())
            .collect();

        // Descending lexicographic order is chronological for the
        // {YYYYMMDD-HHMM}-{hash} layout.
        images.sort_by(|a, b| b.tag.cmp(&a.tag));

        info!(app, count = images.len(), "listed images");
        Ok(images)
    }

    /// Lists version tags for an app, lexicographically descending.
    pub async fn list_tags(&self, app: &str) -> Result<Vec<TagEntry>> {
        let prefix = format!("{TAGS_PREFIX}{app}/");
        debug!(%prefix, "listing tags");

        let keys = self.store.list(&self.bucket, &prefix).await?;
        let mut tags = Vec::new();

        for key in keys.iter().filter(|key| key.ends_with(JSON_SUFFIX)) {
            let version = match basename(key).strip_suffix(JSON_SUFFIX) {
                Some(version) => version.to_string(),
                None => continue,
            };

            let pointer = match self.fetch_pointer(key).await {
                Some(pointer) => pointer,
                None => continue,
            };

            tags.push(TagEntry {
                app_name: app.to_string(),
                version,
                target_image: pointer.source_image,
                s3_path: key.clone(),
            });
        }

        tags.sort_by(|a, b| b.version.cmp(&a.version));

        info!(app, count = tags.len(), "listed tags");
        Ok(tags)
    }

    /// Lists environment pointers for an app, ascending by environment.
    pub async fn list_environments(&self, app: &str) -> Result<Vec<EnvEntry>> {
        let prefix = format!("{POINTERS_PREFIX}{app}/");
        debug!(%prefix, "listing environments");

        let keys = self.store.list(&self.bucket, &prefix).await?;
        let mut environments = Vec::new();

        for key in keys.iter().filter(|key| key.ends_with(JSON_SUFFIX)) {
            let environment = match basename(key).strip_suffix(JSON_SUFFIX) {
                Some(environment) => environment.to_string(),
                None => continue,
            };

            let pointer = match self.fetch_pointer(key).await {
                Some(pointer) => pointer,
                None => continue,
            };

            environments.push(EnvEntry {
                app_name: app.to_string(),
                environment,
                target_type: pointer.target_type,
                target_path: pointer.target_path,
                source_tag: pointer.source_tag,
                source_image: pointer.source_image,
            });
        }

        environments.sort_by(|a, b| a.environment.cmp(&b.environment));

        info!(app, count = environments.len(), "listed environments");
        Ok(environments)
    }

    /// Lists every app that has at least one image, tag, or environment.
    pub async fn list_apps(&self) -> Result<Vec<String>> {
        let mut apps = BTreeSet::new();

        for prefix in [IMAGES_PREFIX, TAGS_PREFIX, POINTERS_PREFIX] {
            // Best-effort union; a failing prefix scan skips that family.
            let keys = match self.store.list(&self.bucket, prefix).await {
                Ok(keys) => keys,
                Err(e) => {
                    debug!(prefix, "prefix scan failed, skipping: {e}");
                    continue;
                }
            };
            for key in keys {
                let mut parts = key.split('/');
                if let (Some(_), Some(app)) = (parts.next(), parts.next()) {
                    if !app.is_empty() {
                        apps.insert(app.to_string());
                    }
                }
            }
        }

        info!(count = apps.len(), "listed apps");
        Ok(apps.into_iter().collect())
    }

    /// Returns the semantic version an environment was promoted through, or
    /// an empty string when it was promoted directly from an image.
    pub async fn tag_for_environment(&self, app: &str, environment: &str) -> Result<String> {
        let env_key = keys::pointer_key(app, environment);

        if !self.store.exists(&self.bucket, &env_key).await? {
            return Err(Error::PointerNotFound(format!("{app}/{environment}")));
        }

        let raw = self.store.download(&self.bucket, &env_key).await?;
        let pointer = PointerMetadata::from_json(&raw)?;

        if pointer.target_type == TargetType::Tag && !pointer.source_tag.is_empty() {
            return Ok(pointer.source_tag);
        }
        Ok(String::new())
    }

    /// Downloads and parses one pointer, best-effort.
    async fn fetch_pointer(&self, key: &str) -> Option<PointerMetadata> {
        let raw = match self.store.download(&self.bucket, key).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(key, "skipping unreadable pointer: {e}");
                return None;
            }
        };
        match PointerMetadata::from_json(&raw) {
            Ok(pointer) => Some(pointer),
            Err(e) => {
                debug!(key, "skipping unparseable pointer: {e}");
                None
            }
        }
    }
}

/// Parses `images/{app}/{ym}/{app}-{tag}.tar.gz` into an [`ImageEntry`].
fn parse_image_entry(key: &str) -> Result<ImageEntry> {
    let invalid = |reason: &str| Error::InvalidImageKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() < 4 {
        return Err(invalid("expected images/{app}/{ym}/{filename}"));
    }

    let app_name = parts[1];
    let year_month = parts[2];
    let filename = parts[3];

    let stem = filename
        .strip_suffix(BLOB_SUFFIX)
        .ok_or_else(|| invalid("expected .tar.gz filename"))?;
    let tag = stem
        .strip_prefix(&format!("{app_name}-"))
        .ok_or_else(|| invalid("filename does not match app name"))?;

    Ok(ImageEntry {
        app_name: app_name.to_string(),
        tag: tag.to_string(),
        s3_path: key.to_string(),
        year_month: year_month.to_string(),
    })
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
