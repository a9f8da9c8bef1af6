//! # Object Key Derivation
//!
//! Pure string transformations between the three naming domains of the
//! system: runtime image references (`myapp:20250721-2118-f7a5a27`), object
//! store keys (`images/myapp/202507/myapp-20250721-2118-f7a5a27.tar.gz`),
//! and their derived sidecar/archive/pointer/audit keys.
//!
//! ## Layout
//!
//! ```text
//! images/{app}/{YYYYMM}/{app}-{gitTime}-{gitHash}.tar.gz   image blob
//! images/{app}/{YYYYMM}/{app}-{gitTime}-{gitHash}.json     metadata sidecar
//! tags/{app}/{version}.json                                tag pointer
//! pointers/{app}/{environment}.json                        environment pointer
//! audit/{app}/{YYYYMM}/{ts}-{event}-{gitHash}.json         audit record
//! archive/{app}/{YYYYMM}/{stem}-archived-on-{ts}.tar.gz    archived blob
//! ```
//!
//! The blob key and the image reference are bijective: a well-formed key
//! maps back to exactly one `{app}:{gitTime}-{gitHash}` reference and vice
//! versa (modulo the `YYYYMM` partition, which is taken from the wall clock
//! at operation time).

use chrono::{DateTime, Utc};

use crate::audit::EventType;
use crate::constants::{
    ARCHIVE_PREFIX, AUDIT_PREFIX, BLOB_SUFFIX, GIT_TIME_DASH_INDEX, GIT_TIME_FORMAT,
    GIT_TIME_LEN, IMAGES_PREFIX, JSON_SUFFIX, MIN_HASH_LEN, POINTERS_PREFIX, TAGS_PREFIX,
    YEAR_MONTH_FORMAT,
};
use crate::error::{Error, Result};

/// Components of a parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Application name (repository basename).
    pub app: String,
    /// Committer timestamp, `YYYYMMDD-HHMM`.
    pub git_time: String,
    /// Abbreviated commit hash.
    pub git_hash: String,
}

impl ImageRef {
    /// Renders the reference back to `{app}:{gitTime}-{gitHash}` form.
    pub fn to_reference(&self) -> String {
        format!("{}:{}-{}", self.app, self.git_time, self.git_hash)
    }
}

/// Returns the blob key for an image.
pub fn image_key(app: &str, git_time: &str, git_hash: &str, year_month: &str) -> String {
    format!("{IMAGES_PREFIX}{app}/{year_month}/{app}-{git_time}-{git_hash}{BLOB_SUFFIX}")
}

/// Returns the metadata sidecar key sharing the blob key's stem.
pub fn metadata_key(blob_key: &str) -> String {
    match blob_key.strip_suffix(BLOB_SUFFIX) {
        Some(stem) => format!("{stem}{JSON_SUFFIX}"),
        None => format!("{blob_key}{JSON_SUFFIX}"),
    }
}

/// Returns the archive keys for a replaced blob/sidecar pair.
///
/// `timestamp` is the archival moment formatted `YYYYMMDD-HHMM`.
pub fn archive_keys(blob_key: &str, timestamp: &str) -> Result<(String, String)> {
    let stem = blob_key
        .strip_prefix(IMAGES_PREFIX)
        .and_then(|rest| rest.strip_suffix(BLOB_SUFFIX))
        .ok_or_else(|| Error::InvalidImageKey {
            key: blob_key.to_string(),
            reason: format!("expected {IMAGES_PREFIX}...{BLOB_SUFFIX}"),
        })?;

    let blob = format!("{ARCHIVE_PREFIX}{stem}-archived-on-{timestamp}{BLOB_SUFFIX}");
    let sidecar = format!("{ARCHIVE_PREFIX}{stem}-archived-on-{timestamp}{JSON_SUFFIX}");
    Ok((blob, sidecar))
}

/// Returns the tag pointer key for a semantic version.
pub fn tag_key(app: &str, version: &str) -> String {
    format!("{TAGS_PREFIX}{app}/{version}{JSON_SUFFIX}")
}

/// Returns the environment pointer key.
pub fn pointer_key(app: &str, environment: &str) -> String {
    format!("{POINTERS_PREFIX}{app}/{environment}{JSON_SUFFIX}")
}

/// Returns the audit record key for an event.
///
/// The monthly partition and the filename timestamp both derive from the
/// event's own timestamp.
pub fn audit_key(
    app: &str,
    timestamp: DateTime<Utc>,
    event: EventType,
    git_hash: &str,
) -> String {
    let year_month = timestamp.format(YEAR_MONTH_FORMAT);
    let time_str = timestamp.format(GIT_TIME_FORMAT);
    format!("{AUDIT_PREFIX}{app}/{year_month}/{time_str}-{event}-{git_hash}{JSON_SUFFIX}")
}

/// Extracts the application name from a runtime image reference: everything
/// between the last `/` and the first `:` of the remainder.
pub fn extract_app_name(image_ref: &str) -> String {
    let after_slash = match image_ref.rfind('/') {
        Some(idx) => &image_ref[idx + 1..],
        None => image_ref,
    };
    match after_slash.find(':') {
        Some(idx) => after_slash[..idx].to_string(),
        None => after_slash.to_string(),
    }
}

/// Parses `{app}:{gitTime}-{gitHash}` into its components.
///
/// The tag must contain exactly two dashes, the timestamp must be 13
/// characters with a dash at index 8, and the hash must be at least 5
/// characters.
pub fn parse_image_reference(image_ref: &str) -> Result<ImageRef> {
    let invalid = |reason: &str| Error::InvalidImageReference {
        reference: image_ref.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = image_ref.split(':').collect();
    if parts.len() != 2 {
        return Err(invalid("expected exactly one ':' separator"));
    }

    let app = parts[0];
    let tag = parts[1];
    let (git_time, git_hash) = split_timestamp_hash(tag).ok_or_else(|| {
        invalid("tag must be '{gitTime}-{gitHash}' with a YYYYMMDD-HHMM timestamp")
    })?;

    Ok(ImageRef {
        app: app.to_string(),
        git_time: git_time.to_string(),
        git_hash: git_hash.to_string(),
    })
}

/// Maps a blob key back to its runtime image reference.
///
/// `images/myapp/202507/myapp-20250721-1430-abc1234.tar.gz`
/// becomes `myapp:20250721-1430-abc1234`.
pub fn image_ref_from_key(blob_key: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidImageKey {
        key: blob_key.to_string(),
        reason: reason.to_string(),
    };

    let stem = blob_key
        .strip_suffix(BLOB_SUFFIX)
        .ok_or_else(|| invalid("must end with .tar.gz"))?;

    let filename = match stem.rfind('/') {
        Some(idx) => &stem[idx + 1..],
        None => stem,
    };

    // Filename layout: {app}-{gitTime}-{gitHash}; the app name itself
    // contains no dash before the timestamp starts.
    let (app, tag) = filename
        .split_once('-')
        .ok_or_else(|| invalid("filename must be '{app}-{gitTime}-{gitHash}'"))?;

    let (git_time, git_hash) = split_timestamp_hash(tag)
        .ok_or_else(|| invalid("filename must carry a YYYYMMDD-HHMM timestamp and a hash"))?;

    Ok(format!("{app}:{git_time}-{git_hash}"))
}

/// Splits `20250721-1430-abc1234` into `(20250721-1430, abc1234)`,
/// validating shape. Returns `None` on any violation.
fn split_timestamp_hash(tag: &str) -> Option<(&str, &str)> {
    if tag.matches('-').count() != 2 {
        return None;
    }

    let last_dash = tag.rfind('-')?;
    let git_time = &tag[..last_dash];
    let git_hash = &tag[last_dash + 1..];

    if git_hash.len() < MIN_HASH_LEN {
        return None;
    }
    if git_time.len() != GIT_TIME_LEN || git_time.as_bytes()[GIT_TIME_DASH_INDEX] != b'-' {
        return None;
    }

    Some((git_time, git_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_image_key_layout() {
        let key = image_key("myapp", "20250721-2118", "f7a5a27", "202507");
        assert_eq!(key, "images/myapp/202507/myapp-20250721-2118-f7a5a27.tar.gz");
    }

    #[test]
    fn test_metadata_key_replaces_extension() {
        let key = metadata_key("images/myapp/202507/myapp-20250721-2118-f7a5a27.tar.gz");
        assert_eq!(key, "images/myapp/202507/myapp-20250721-2118-f7a5a27.json");
    }

    #[test]
    fn test_archive_keys() {
        let (blob, sidecar) = archive_keys(
            "images/myapp/202507/myapp-20250721-2118-f7a5a27.tar.gz",
            "20250722-1018",
        )
        .unwrap();
        assert_eq!(
            blob,
            "archive/myapp/202507/myapp-20250721-2118-f7a5a27-archived-on-20250722-1018.tar.gz"
        );
        assert_eq!(
            sidecar,
            "archive/myapp/202507/myapp-20250721-2118-f7a5a27-archived-on-20250722-1018.json"
        );
    }

    #[test]
    fn test_archive_keys_reject_foreign_prefix() {
        assert!(archive_keys("tags/myapp/v1.json", "20250722-1018").is_err());
    }

    #[test]
    fn test_pointer_and_tag_keys() {
        assert_eq!(tag_key("myapp", "v1.2.0"), "tags/myapp/v1.2.0.json");
        assert_eq!(
            pointer_key("myapp", "production"),
            "pointers/myapp/production.json"
        );
    }

    #[test]
    fn test_audit_key_derives_from_event_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 7, 21, 21, 30, 0).unwrap();
        let key = audit_key("myapp", ts, EventType::Push, "f7a5a27");
        assert_eq!(key, "audit/myapp/202507/20250721-2130-push-f7a5a27.json");
    }

    #[test]
    fn test_extract_app_name() {
        assert_eq!(extract_app_name("myapp:20250721-2118-f7a5a27"), "myapp");
        assert_eq!(extract_app_name("registry.example.com/team/myapp:tag"), "myapp");
        assert_eq!(extract_app_name("plain"), "plain");
    }

    #[test]
    fn test_parse_image_reference() {
        let parsed = parse_image_reference("myapp:20250721-2118-f7a5a27").unwrap();
        assert_eq!(parsed.app, "myapp");
        assert_eq!(parsed.git_time, "20250721-2118");
        assert_eq!(parsed.git_hash, "f7a5a27");
        assert_eq!(parsed.to_reference(), "myapp:20250721-2118-f7a5a27");
    }

    #[test]
    fn test_parse_image_reference_rejects_short_hash() {
        assert!(parse_image_reference("myapp:20250721-2118-f7a5").is_err());
    }

    #[test]
    fn test_parse_image_reference_rejects_bad_timestamp() {
        // 12-character timestamp
        assert!(parse_image_reference("myapp:2025072-2118-f7a5a27").is_err());
        // dash in the wrong position
        assert!(parse_image_reference("myapp:202507212-118-f7a5a27").is_err());
    }

    #[test]
    fn test_parse_image_reference_rejects_wrong_dash_count() {
        assert!(parse_image_reference("myapp:latest").is_err());
        assert!(parse_image_reference("myapp:20250721-2118-f7a5a27-extra").is_err());
    }

    #[test]
    fn test_parse_image_reference_rejects_multiple_colons() {
        assert!(parse_image_reference("host:5000/myapp:20250721-2118-f7a5a27").is_err());
    }

    #[test]
    fn test_image_ref_from_key() {
        let image_ref =
            image_ref_from_key("images/myapp/202507/myapp-20250721-1430-abc1234.tar.gz").unwrap();
        assert_eq!(image_ref, "myapp:20250721-1430-abc1234");
    }

    #[test]
    fn test_image_ref_from_key_rejects_wrong_suffix() {
        assert!(image_ref_from_key("images/myapp/202507/myapp-20250721-1430-abc1234.tar").is_err());
    }

    #[test]
    fn test_image_ref_from_key_rejects_malformed_filename() {
        assert!(image_ref_from_key("images/myapp/202507/noversion.tar.gz").is_err());
        assert!(image_ref_from_key("images/myapp/202507/myapp-20250721-1430-ab.tar.gz").is_err());
    }

    #[test]
    fn test_key_reference_round_trip() {
        let key = image_key("myapp", "20250721-2118", "f7a5a27", "202507");
        let reference = image_ref_from_key(&key).unwrap();
        let parsed = parse_image_reference(&reference).unwrap();
        assert_eq!(parsed.app, "myapp");
        assert_eq!(parsed.git_time, "20250721-2118");
        assert_eq!(parsed.git_hash, "f7a5a27");
        assert_eq!(
            image_key(&parsed.app, &parsed.git_time, &parsed.git_hash, "202507"),
            key
        );
    }
}
