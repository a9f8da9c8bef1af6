//! Tests for the listing projections.

mod common;

use std::sync::Arc;

use common::MemoryStore;
use s3dock::pointer::{PointerMetadata, TargetType};
use s3dock::ListService;

const BUCKET: &str = "test-bucket";

fn seed_blob(store: &MemoryStore, app: &str, ym: &str, tag: &str) {
    store.seed(
        &format!("images/{app}/{ym}/{app}-{tag}.tar.gz"),
        b"blob".to_vec(),
    );
    store.seed(
        &format!("images/{app}/{ym}/{app}-{tag}.json"),
        b"{}".to_vec(),
    );
}

fn seed_tag(store: &MemoryStore, app: &str, version: &str, source_image: &str) {
    let pointer = PointerMetadata::image(
        &format!("images/{app}/202507/{app}-20250721-2118-f7a5a27.tar.gz"),
        "f7a5a27",
        "20250721-2118",
        source_image,
    );
    store.seed(
        &format!("tags/{app}/{version}.json"),
        pointer.to_json().unwrap(),
    );
}

#[tokio::test]
async fn test_list_images_filters_and_sorts_newest_first() {
    let store = Arc::new(MemoryStore::new());
    seed_blob(&store, "myapp", "202506", "20250630-0900-aaaaa11");
    seed_blob(&store, "myapp", "202507", "20250721-2118-f7a5a27");
    seed_blob(&store, "myapp", "202507", "20250701-1200-bbbbb22");
    seed_blob(&store, "other", "202507", "20250702-1300-ccccc33");

    let images = ListService::new(store, BUCKET)
        .list_images("myapp", None)
        .await
        .unwrap();

    // Sidecars excluded, other apps excluded, newest tag first.
    let tags: Vec<&str> = images.iter().map(|image| image.tag.as_str()).collect();
    assert_eq!(
        tags,
        vec![
            "20250721-2118-f7a5a27",
            "20250701-1200-bbbbb22",
            "20250630-0900-aaaaa11",
        ]
    );
    assert!(images.iter().all(|image| image.app_name == "myapp"));
}

#[tokio::test]
async fn test_list_images_by_month() {
    let store = Arc::new(MemoryStore::new());
    seed_blob(&store, "myapp", "202506", "20250630-0900-aaaaa11");
    seed_blob(&store, "myapp", "202507", "20250721-2118-f7a5a27");

    let images = ListService::new(store, BUCKET)
        .list_images("myapp", Some("202506"))
        .await
        .unwrap();

    assert_eq!(images.len(), 1);
    assert_eq!(images[0].year_month, "202506");
}

#[tokio::test]
async fn test_list_tags_projects_and_sorts_descending() {
    let store = Arc::new(MemoryStore::new());
    seed_tag(&store, "myapp", "v1.2.0", "myapp:20250721-2118-f7a5a27");
    seed_tag(&store, "myapp", "v1.10.0", "myapp:20250722-0900-aaaaa11");
    seed_tag(&store, "myapp", "v1.9.0", "myapp:20250720-0800-bbbbb22");

    let tags = ListService::new(store, BUCKET)
        .list_tags("myapp")
        .await
        .unwrap();

    // Lexicographic descending, not semver-aware: v1.9.0 sorts above
    // v1.10.0.
    let versions: Vec<&str> = tags.iter().map(|tag| tag.version.as_str()).collect();
    assert_eq!(versions, vec!["v1.9.0", "v1.2.0", "v1.10.0"]);
    assert_eq!(tags[1].target_image, "myapp:20250721-2118-f7a5a27");
}

#[tokio::test]
async fn test_list_tags_skips_corrupt_pointers() {
    let store = Arc::new(MemoryStore::new());
    seed_tag(&store, "myapp", "v1.0.0", "myapp:20250721-2118-f7a5a27");
    store.seed("tags/myapp/v0.9.0.json", b"not json at all".to_vec());

    let tags = ListService::new(store, BUCKET)
        .list_tags("myapp")
        .await
        .unwrap();

    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].version, "v1.0.0");
}

#[tokio::test]
async fn test_list_environments_sorted_ascending() {
    let store = Arc::new(MemoryStore::new());

    let direct = PointerMetadata::image(
        "images/myapp/202507/myapp-20250721-2118-f7a5a27.tar.gz",
        "f7a5a27",
        "20250721-2118",
        "myapp:20250721-2118-f7a5a27",
    );
    store.seed("pointers/myapp/staging.json", direct.to_json().unwrap());

    let via_tag = PointerMetadata::tag(
        "tags/myapp/v1.2.0.json",
        "f7a5a27",
        "20250721-2118",
        "myapp:20250721-2118-f7a5a27",
        "v1.2.0",
    );
    store.seed("pointers/myapp/production.json", via_tag.to_json().unwrap());

    let environments = ListService::new(store, BUCKET)
        .list_environments("myapp")
        .await
        .unwrap();

    assert_eq!(environments.len(), 2);
    assert_eq!(environments[0].environment, "production");
    assert_eq!(environments[0].target_type, TargetType::Tag);
    assert_eq!(environments[0].source_tag, "v1.2.0");
    assert_eq!(environments[1].environment, "staging");
    assert_eq!(environments[1].target_type, TargetType::Image);
    assert!(environments[1].source_tag.is_empty());
}

#[tokio::test]
async fn test_list_apps_unions_all_prefixes() {
    let store = Arc::new(MemoryStore::new());
    seed_blob(&store, "alpha", "202507", "20250721-2118-f7a5a27");
    seed_tag(&store, "gamma", "v1.0.0", "gamma:20250721-2118-f7a5a27");
    let pointer = PointerMetadata::image(
        "images/beta/202507/beta-20250721-2118-f7a5a27.tar.gz",
        "f7a5a27",
        "20250721-2118",
        "beta:20250721-2118-f7a5a27",
    );
    store.seed("pointers/beta/production.json", pointer.to_json().unwrap());

    let apps = ListService::new(store, BUCKET).list_apps().await.unwrap();

    assert_eq!(apps, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_tag_for_environment_promoted_via_tag() {
    let store = Arc::new(MemoryStore::new());
    let via_tag = PointerMetadata::tag(
        "tags/myapp/v1.2.0.json",
        "f7a5a27",
        "20250721-2118",
        "myapp:20250721-2118-f7a5a27",
        "v1.2.0",
    );
    store.seed("pointers/myapp/production.json", via_tag.to_json().unwrap());

    let tag = ListService::new(store, BUCKET)
        .tag_for_environment("myapp", "production")
        .await
        .unwrap();

    assert_eq!(tag, "v1.2.0");
}

#[tokio::test]
async fn test_tag_for_environment_promoted_directly() {
    let store = Arc::new(MemoryStore::new());
    let direct = PointerMetadata::image(
        "images/myapp/202507/myapp-20250721-2118-f7a5a27.tar.gz",
        "f7a5a27",
        "20250721-2118",
        "myapp:20250721-2118-f7a5a27",
    );
    store.seed("pointers/myapp/staging.json", direct.to_json().unwrap());

    let tag = ListService::new(store, BUCKET)
        .tag_for_environment("myapp", "staging")
        .await
        .unwrap();

    assert_eq!(tag, "");
}

#[tokio::test]
async fn test_tag_for_environment_missing_pointer() {
    let store = Arc::new(MemoryStore::new());

    let result = ListService::new(store, BUCKET)
        .tag_for_environment("myapp", "production")
        .await;

    assert!(result.is_err());
}
