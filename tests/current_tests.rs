//! Tests for the current resolver.

mod common;

use std::sync::Arc;

use common::MemoryStore;
use s3dock::error::Error;
use s3dock::pointer::PointerMetadata;
use s3dock::CurrentService;

const BUCKET: &str = "test-bucket";
const BLOB_KEY: &str = "images/myapp/202507/myapp-20250721-1430-abc1234.tar.gz";
const IMAGE_REF: &str = "myapp:20250721-1430-abc1234";

#[tokio::test]
async fn test_current_resolves_direct_image_pointer() {
    let store = Arc::new(MemoryStore::new());
    let pointer = PointerMetadata::image(BLOB_KEY, "abc1234", "20250721-1430", IMAGE_REF);
    store.seed("pointers/myapp/staging.json", pointer.to_json().unwrap());

    let outcome = CurrentService::new(store, BUCKET)
        .current_image("myapp", "staging")
        .await
        .unwrap();

    assert_eq!(outcome.image_ref, IMAGE_REF);
    assert_eq!(outcome.app_name, "myapp");
    assert_eq!(outcome.environment, "staging");
}

#[tokio::test]
async fn test_current_resolves_through_tag() {
    let store = Arc::new(MemoryStore::new());
    let tag = PointerMetadata::image(BLOB_KEY, "abc1234", "20250721-1430", IMAGE_REF);
    store.seed("tags/myapp/v1.2.0.json", tag.to_json().unwrap());
    let env = PointerMetadata::tag(
        "tags/myapp/v1.2.0.json",
        "abc1234",
        "20250721-1430",
        IMAGE_REF,
        "v1.2.0",
    );
    store.seed("pointers/myapp/production.json", env.to_json().unwrap());

    let outcome = CurrentService::new(store, BUCKET)
        .current_image("myapp", "production")
        .await
        .unwrap();

    assert_eq!(outcome.image_ref, IMAGE_REF);
}

#[tokio::test]
async fn test_current_missing_pointer() {
    let store = Arc::new(MemoryStore::new());

    let result = CurrentService::new(store, BUCKET)
        .current_image("myapp", "production")
        .await;

    assert!(matches!(result, Err(Error::PointerNotFound(_))));
}

#[tokio::test]
async fn test_current_rejects_malformed_blob_key() {
    let store = Arc::new(MemoryStore::new());
    let pointer = PointerMetadata::image(
        "images/myapp/202507/not-a-valid-name.tar",
        "abc1234",
        "20250721-1430",
        IMAGE_REF,
    );
    store.seed("pointers/myapp/staging.json", pointer.to_json().unwrap());

    let result = CurrentService::new(store, BUCKET)
        .current_image("myapp", "staging")
        .await;

    assert!(matches!(result, Err(Error::InvalidImageKey { .. })));
}

#[tokio::test]
async fn test_current_bounds_tag_chains() {
    let store = Arc::new(MemoryStore::new());
    // A tag pointer that points at itself: the resolver must give up
    // instead of looping.
    let cyclic = PointerMetadata::tag(
        "tags/myapp/loop.json",
        "abc1234",
        "20250721-1430",
        IMAGE_REF,
        "loop",
    );
    store.seed("tags/myapp/loop.json", cyclic.to_json().unwrap());
    store.seed("pointers/myapp/staging.json", cyclic.to_json().unwrap());

    let result = CurrentService::new(store, BUCKET)
        .current_image("myapp", "staging")
        .await;

    assert!(matches!(result, Err(Error::PointerChainTooDeep(_))));
}
