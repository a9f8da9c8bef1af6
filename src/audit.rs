//! # Append-Only Audit Log
//!
//! Every state-mutating operation appends one JSON record under a monthly
//! partition key (`audit/{app}/{YYYYMM}/{ts}-{event}-{gitHash}.json`). The
//! system never reads these records back; they exist for external
//! inspection. Writes are best-effort for push and tag (logged, never
//! fatal) and fatal for promotion. Callers decide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::keys;
use crate::store::ObjectStore;

/// Kind of state mutation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Blob + sidecar push (or dedup skip).
    Push,
    /// Tag pointer creation.
    Tag,
    /// Environment pointer creation/update.
    Promotion,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Push => f.write_str("push"),
            EventType::Tag => f.write_str("tag"),
            EventType::Promotion => f.write_str("promotion"),
        }
    }
}

/// Payload of a push record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushDetails {
    pub image_reference: String,
    pub s3_path: String,
    pub checksum: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub was_skipped: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub was_archived: bool,
}

/// Payload of a tag record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDetails {
    pub image_reference: String,
    pub version: String,
    pub tag_path: String,
}

/// Payload of a promotion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDetails {
    pub environment: String,
    pub source: String,
    /// `"image"` or `"tag"`.
    pub source_type: String,
    pub pointer_path: String,
    /// `target_path` the environment pointer carried before this write;
    /// empty when the pointer did not exist.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_target: String,
}

/// Typed payload, discriminated by the sibling `event_type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventDetails {
    Push(PushDetails),
    Tag(TagDetails),
    Promotion(PromotionDetails),
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub app_name: String,
    pub git_hash: String,
    pub git_time: String,
    pub details: EventDetails,
}

impl AuditEvent {
    /// Builds a push record.
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        app_name: &str,
        git_hash: &str,
        git_time: &str,
        image_reference: &str,
        s3_path: &str,
        checksum: &str,
        size: i64,
        was_skipped: bool,
        was_archived: bool,
    ) -> Self {
        Self::new(
            EventType::Push,
            app_name,
            git_hash,
            git_time,
            EventDetails::Push(PushDetails {
                image_reference: image_reference.to_string(),
                s3_path: s3_path.to_string(),
                checksum: checksum.to_string(),
                size,
                was_skipped,
                was_archived,
            }),
        )
    }

    /// Builds a tag record.
    pub fn tag(
        app_name: &str,
        git_hash: &str,
        git_time: &str,
        image_reference: &str,
        version: &str,
        tag_path: &str,
    ) -> Self {
        Self::new(
            EventType::Tag,
            app_name,
            git_hash,
            git_time,
            EventDetails::Tag(TagDetails {
                image_reference: image_reference.to_string(),
                version: version.to_string(),
                tag_path: tag_path.to_string(),
            }),
        )
    }

    /// Builds a promotion record.
    #[allow(clippy::too_many_arguments)]
    pub fn promotion(
        app_name: &str,
        git_hash: &str,
        git_time: &str,
        environment: &str,
        source: &str,
        source_type: &str,
        pointer_path: &str,
        previous_target: &str,
    ) -> Self {
        Self::new(
            EventType::Promotion,
            app_name,
            git_hash,
            git_time,
            EventDetails::Promotion(PromotionDetails {
                environment: environment.to_string(),
                source: source.to_string(),
                source_type: source_type.to_string(),
                pointer_path: pointer_path.to_string(),
                previous_target: previous_target.to_string(),
            }),
        )
    }

    fn new(
        event_type: EventType,
        app_name: &str,
        git_hash: &str,
        git_time: &str,
        details: EventDetails,
    ) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            user: whoami::fallible::username().unwrap_or_else(|_| "unknown".to_string()),
            app_name: app_name.to_string(),
            git_hash: git_hash.to_string(),
            git_time: git_time.to_string(),
            details,
        }
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses an audit record.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Sink for audit records.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Persists one event. Callers decide whether a failure is fatal.
    async fn log_event(&self, event: &AuditEvent) -> Result<()>;
}

/// Audit logger writing records into the object store.
pub struct StoreAuditLogger {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl StoreAuditLogger {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl AuditLogger for StoreAuditLogger {
    async fn log_event(&self, event: &AuditEvent) -> Result<()> {
        let key = keys::audit_key(
            &event.app_name,
            event.timestamp,
            event.event_type,
            &event.git_hash,
        );
        let body = event.to_json()?;

        self.store
            .upload(&self.bucket, &key, body)
            .await
            .map_err(|e| Error::Audit(e.to_string()))?;

        debug!(%key, "audit event written");
        Ok(())
    }
}
