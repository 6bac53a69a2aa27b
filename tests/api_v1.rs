mod common;

use common::{seeded_v1_state, TestApi};
use cps::config::ApiVersion;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test(flavor = "multi_thread")]
async fn properties_merge_the_discovery_map() -> anyhow::Result<()> {
    let api = TestApi::spawn(seeded_v1_state(), ApiVersion::V1).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/properties/service-one", api.base_url))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("application/json")
    );

    let body = response.text().await?;
    assert_eq!(
        body,
        r#"{"bool-prop":true,"consul":{"service-one":["127.0.0.1"]},"float-prop":1.5,"int-prop":1,"string-prop":"string"}"#
    );

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_service_answers_200_with_an_empty_body() -> anyhow::Result<()> {
    let api = TestApi::spawn(seeded_v1_state(), ApiVersion::V1).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/properties/service-unknown", api.base_url))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "");

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn single_property_is_served_as_plain_text() -> anyhow::Result<()> {
    let api = TestApi::spawn(seeded_v1_state(), ApiVersion::V1).await?;
    let client = reqwest::Client::new();

    let cases = [
        ("string-prop", "string"),
        ("bool-prop", "true"),
        ("int-prop", "1"),
        ("float-prop", "1.5"),
        ("missing-prop", "{}"),
    ];

    for (property, expected) in cases {
        let response = client
            .get(format!(
                "{}/v1/properties/service-one/{property}",
                api.base_url
            ))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "property {property}");
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|value| value.to_str().ok()),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(response.text().await?, expected, "property {property}");
    }

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn conqueso_renders_properties_and_discovered_ips() -> anyhow::Result<()> {
    let api = TestApi::spawn(seeded_v1_state(), ApiVersion::V1).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/conqueso/service-one", api.base_url))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.text().await?;
    let lines: Vec<&str> = body.lines().collect();
    assert!(lines.contains(&"string-prop=string"), "body: {body}");
    assert!(lines.contains(&"bool-prop=true"), "body: {body}");
    assert!(lines.contains(&"int-prop=1"), "body: {body}");
    assert!(lines.contains(&"float-prop=1.5"), "body: {body}");
    assert!(
        lines.contains(&"conqueso.service-one.ips=127.0.0.1"),
        "body: {body}"
    );

    // Every line is a single key=value pair; ip lists never end in a comma.
    for line in &lines {
        let (key, value) = line.split_once('=').expect("line has an equals sign");
        assert!(!key.is_empty(), "line: {line}");
        assert!(!value.ends_with(','), "line: {line}");
    }

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn conqueso_accepts_posts_with_an_empty_answer() -> anyhow::Result<()> {
    let api = TestApi::spawn(seeded_v1_state(), ApiVersion::V1).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/conqueso/service-one", api.base_url))
        .body("instance metadata the service ignores")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "");

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn head_matches_get_for_every_endpoint() -> anyhow::Result<()> {
    let state = seeded_v1_state();
    state.watchers.object_store.flags().mark_success();
    state.watchers.catalog.flags().mark_success();
    let api = TestApi::spawn(state, ApiVersion::V1).await?;
    let client = reqwest::Client::new();

    let endpoints = [
        "/v1/properties/service-one",
        "/v1/properties/service-one/string-prop",
        "/v1/conqueso/service-one",
        "/v1/health",
        "/v1/healthz",
    ];

    for endpoint in endpoints {
        let url = format!("{}{endpoint}", api.base_url);
        let get = client.get(&url).send().await?;
        let get_status = get.status();
        let get_type = get.headers().get("content-type").cloned();

        let head = client.head(&url).send().await?;
        assert_eq!(head.status(), get_status, "endpoint {endpoint}");
        assert_eq!(
            head.headers().get("content-type").cloned(),
            get_type,
            "endpoint {endpoint}"
        );
        assert_eq!(head.text().await?, "", "HEAD body must be empty");
    }

    api.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn properties_are_merged_with_an_empty_map_when_discovery_is_off() -> anyhow::Result<()> {
    let state = common::empty_state(cps::kv::WatcherSet::new(true, false, false));
    let mut bundle = cps::domain::PropertyBundle::new();
    bundle.insert(
        "only-prop".to_string(),
        cps::domain::PropertyValue::String("v".to_string()),
    );
    state
        .cache
        .store("123456/us-east-1/lonely", cps::kv::CacheValue::Bundle(bundle));
    state.cache.store(
        cps::domain::DISCOVERY_KEY,
        cps::kv::CacheValue::Endpoints(cps::domain::EndpointMap::new()),
    );

    let api = TestApi::spawn(state, ApiVersion::V1).await?;
    let response = reqwest::get(format!("{}/v1/properties/lonely", api.base_url)).await?;
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"only-prop": "v", "consul": {}}));

    api.stop().await;
    Ok(())
}
