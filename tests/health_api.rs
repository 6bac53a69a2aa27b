mod common;

use common::{empty_state, TestApi};
use cps::config::ApiVersion;
use cps::kv::WatcherSet;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test(flavor = "multi_thread")]
async fn healthz_reports_down_until_both_watchers_publish() -> anyhow::Result<()> {
    let state = empty_state(WatcherSet::new(true, true, false));
    let api = TestApi::spawn(state, ApiVersion::V1).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/v1/healthz", api.base_url);

    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "down", "consul": false, "s3": false}));

    api.state.watchers.object_store.flags().mark_success();
    api.state.watchers.catalog.flags().mark_success();

    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "up", "consul": true, "s3": true}));

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn healthz_stays_up_through_a_degraded_tick() -> anyhow::Result<()> {
    let state = empty_state(WatcherSet::new(true, true, false));
    state.watchers.object_store.flags().mark_success();
    state.watchers.catalog.flags().mark_success();
    // A later failed poll degrades readiness but not liveness.
    state.watchers.object_store.flags().mark_degraded();

    let api = TestApi::spawn(state, ApiVersion::V1).await?;
    let client = reqwest::Client::new();

    let healthz = client
        .get(format!("{}/v1/healthz", api.base_url))
        .send()
        .await?;
    assert_eq!(healthz.status(), StatusCode::OK);

    let health = client
        .get(format!("{}/v1/health", api.base_url))
        .send()
        .await?;
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = health.json().await?;
    assert_eq!(body["status"], json!(503));
    assert_eq!(body["plugins"], json!({"consul": true, "s3": false}));

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_200_when_all_recent_ticks_succeeded() -> anyhow::Result<()> {
    let state = empty_state(WatcherSet::new(true, true, false));
    state.watchers.object_store.flags().mark_success();
    state.watchers.catalog.flags().mark_success();

    let api = TestApi::spawn(state, ApiVersion::V1).await?;
    let response = reqwest::get(format!("{}/v1/health", api.base_url)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(
        body,
        json!({"status": 200, "plugins": {"consul": true, "s3": true}})
    );

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_watchers_are_excluded_from_aggregation() -> anyhow::Result<()> {
    // Discovery disabled: only the object store gates health.
    let state = empty_state(WatcherSet::new(true, false, false));
    state.watchers.object_store.flags().mark_success();

    let api = TestApi::spawn(state, ApiVersion::V1).await?;
    let response = reqwest::get(format!("{}/v1/healthz", api.base_url)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], json!("up"));
    assert_eq!(body["consul"], json!(false), "flag reported but not gating");

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn file_mode_reports_the_directory_watcher() -> anyhow::Result<()> {
    let state = empty_state(WatcherSet::new(false, false, true));
    state.watchers.directory.flags().mark_success();

    let api = TestApi::spawn(state, ApiVersion::V1).await?;
    let response = reqwest::get(format!("{}/v1/healthz", api.base_url)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "up", "file": true}));

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn v2_healthz_tracks_the_object_store_watcher() -> anyhow::Result<()> {
    let state = empty_state(WatcherSet::new(true, false, false));
    let api = TestApi::spawn(state, ApiVersion::V2).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/v2/healthz", api.base_url);

    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "down", "s3": false}));

    api.state.watchers.object_store.flags().mark_success();

    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "up", "s3": true}));

    api.stop().await;
    Ok(())
}
