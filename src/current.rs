//! # Current Resolver
//!
//! Answers "what is deployed to this environment" without touching the
//! runtime: the same pointer walk as the puller, followed by the inverse
//! key-to-reference mapping.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::keys;
use crate::pointer::{self, PointerMetadata};
use crate::store::ObjectStore;

/// Result of one current lookup.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentOutcome {
    pub app_name: String,
    pub environment: String,
    pub image_ref: String,
}

/// Resolves environment pointers to runtime image references.
pub struct CurrentService {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl CurrentService {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Returns the image reference an environment currently resolves to.
    pub async fn current_image(&self, app: &str, environment: &str) -> Result<CurrentOutcome> {
        let env_key = keys::pointer_key(app, environment);
        debug!(%env_key, "resolving environment pointer");

        if !self.store.exists(&self.bucket, &env_key).await? {
            return Err(Error::PointerNotFound(format!("{app}/{environment}")));
        }

        let raw = self.store.download(&self.bucket, &env_key).await?;
        let env_pointer = PointerMetadata::from_json(&raw)?;

        let blob_key =
            pointer::resolve_image_key(self.store.as_ref(), &self.bucket, &env_pointer).await?;
        let image_ref = keys::image_ref_from_key(&blob_key)?;

        info!(app, environment, %image_ref, "resolved current image");
        Ok(CurrentOutcome {
            app_name: app.to_string(),
            environment: environment.to_string(),
            image_ref,
        })
    }
}
