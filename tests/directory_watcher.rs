mod common;

use common::{failing_injector, fixed_injector};
use cps::config::ApiVersion;
use cps::domain::{PropertyBundle, PropertyValue};
use cps::kv::{CacheValue, PropertyCache, WatcherFlags};
use cps::watchers::{DirectoryWatcher, Watcher};
use std::sync::Arc;

fn watcher(
    dir: &std::path::Path,
    api: ApiVersion,
    injector: Arc<cps::secrets::SecretInjector>,
    cache: Arc<PropertyCache>,
) -> DirectoryWatcher {
    DirectoryWatcher::new(
        dir.to_path_buf(),
        "123456",
        "us-east-1",
        injector,
        Arc::clone(&cache),
        Arc::new(WatcherFlags::default()),
        api,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn v1_files_publish_coerced_bundles() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("service-one.json"),
        r#"{
            "string-prop": "string",
            "bool-prop": true,
            "int-prop": 1,
            "float-prop": 1.5,
            "null-prop": null,
            "secret-prop": {"$ssm": {"region": "us-east-1", "encrypted": "true"}}
        }"#,
    )?;

    let cache = Arc::new(PropertyCache::new());
    let watcher = watcher(
        dir.path(),
        ApiVersion::V1,
        fixed_injector("DECRYPTED!"),
        Arc::clone(&cache),
    );
    watcher.sync().await?;

    assert!(watcher.flags().up() && watcher.flags().health());

    let bundle = cache
        .bundle("123456/us-east-1/service-one")
        .expect("bundle published");
    assert_eq!(
        bundle.get("string-prop"),
        Some(&PropertyValue::String("string".to_string()))
    );
    assert_eq!(bundle.get("bool-prop"), Some(&PropertyValue::Bool(true)));
    assert_eq!(bundle.get("int-prop"), Some(&PropertyValue::Int(1)));
    assert_eq!(bundle.get("float-prop"), Some(&PropertyValue::Float(1.5)));
    assert_eq!(
        bundle.get("null-prop"),
        Some(&PropertyValue::String(String::new())),
        "null coerces to the empty string"
    );
    assert_eq!(
        bundle.get("secret-prop"),
        Some(&PropertyValue::String("DECRYPTED!".to_string()))
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn one_bad_file_never_blocks_the_rest() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("broken.json"), "{not json")?;
    std::fs::write(dir.path().join("good.json"), r#"{"k": "v"}"#)?;
    std::fs::write(dir.path().join("notes.txt"), "not a property file")?;

    let cache = Arc::new(PropertyCache::new());
    let watcher = watcher(
        dir.path(),
        ApiVersion::V1,
        fixed_injector("unused"),
        Arc::clone(&cache),
    );
    watcher.sync().await?;

    assert!(cache.bundle("123456/us-east-1/good").is_some());
    assert!(cache.bundle("123456/us-east-1/broken").is_none());
    assert!(cache.bundle("123456/us-east-1/notes").is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_resolution_falls_back_to_the_cached_value() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("service-one.json"),
        r#"{
            "plain": "fresh",
            "secret-prop": {"$ssm": {"region": "us-east-1", "encrypted": "true"}}
        }"#,
    )?;

    let cache = Arc::new(PropertyCache::new());
    let mut previous = PropertyBundle::new();
    previous.insert(
        "secret-prop".to_string(),
        PropertyValue::String("stale-but-served".to_string()),
    );
    cache.store("123456/us-east-1/service-one", CacheValue::Bundle(previous));

    let watcher = watcher(
        dir.path(),
        ApiVersion::V1,
        failing_injector(),
        Arc::clone(&cache),
    );
    watcher.sync().await?;

    let bundle = cache
        .bundle("123456/us-east-1/service-one")
        .expect("bundle kept");
    assert_eq!(
        bundle.get("secret-prop"),
        Some(&PropertyValue::String("stale-but-served".to_string()))
    );
    assert_eq!(
        bundle.get("plain"),
        Some(&PropertyValue::String("fresh".to_string())),
        "non-secret properties still refresh"
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_resolution_without_a_cached_value_skips_the_service() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("service-one.json"),
        r#"{"secret-prop": {"$ssm": {"region": "us-east-1", "encrypted": "true"}}}"#,
    )?;
    std::fs::write(dir.path().join("service-two.json"), r#"{"k": 2}"#)?;

    let cache = Arc::new(PropertyCache::new());
    let watcher = watcher(
        dir.path(),
        ApiVersion::V1,
        failing_injector(),
        Arc::clone(&cache),
    );
    watcher.sync().await?;

    assert!(
        cache.bundle("123456/us-east-1/service-one").is_none(),
        "service with the unresolvable secret is skipped"
    );
    assert!(cache.bundle("123456/us-east-1/service-two").is_some());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn v2_files_publish_injected_documents() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("service-one.json"),
        r#"{
            "properties": {
                "flat": {"$ssm": {"region": "us-east-1", "encrypted": "X"}},
                "keep-null": null,
                "keep-empty": {}
            }
        }"#,
    )?;

    let cache = Arc::new(PropertyCache::new());
    let watcher = watcher(
        dir.path(),
        ApiVersion::V2,
        fixed_injector("DECRYPTED!"),
        Arc::clone(&cache),
    );
    watcher.sync().await?;

    let Some(entry) = cache.load("service-one") else {
        panic!("document published");
    };
    let CacheValue::Document(blob) = entry.as_ref() else {
        panic!("expected a serialised document");
    };
    let document: serde_json::Value = serde_json::from_slice(blob)?;
    assert_eq!(
        document,
        serde_json::json!({
            "properties": {
                "flat": "DECRYPTED!",
                "keep-null": null,
                "keep-empty": {}
            }
        })
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_directory_degrades_health_but_not_liveness() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("svc.json"), r#"{"k": "v"}"#)?;

    let cache = Arc::new(PropertyCache::new());
    let watcher = watcher(
        dir.path(),
        ApiVersion::V1,
        fixed_injector("unused"),
        Arc::clone(&cache),
    );
    watcher.sync().await?;
    assert!(watcher.flags().up());

    drop(dir);
    assert!(watcher.sync().await.is_err());
    assert!(watcher.flags().up(), "liveness survives a failed tick");
    assert!(!watcher.flags().health());
    assert!(
        cache.bundle("123456/us-east-1/svc").is_some(),
        "last-known-good bundle remains served"
    );

    Ok(())
}
