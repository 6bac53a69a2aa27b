use crate::app_state::AppState;
use crate::kv::WatcherSet;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Map, Value};

fn plugin_flags(watchers: &WatcherSet, liveness: bool) -> Map<String, Value> {
    let mut plugins = Map::new();
    if watchers.directory.enabled() {
        let flag = if liveness {
            watchers.directory.up()
        } else {
            watchers.directory.health()
        };
        plugins.insert("file".to_string(), Value::Bool(flag));
    } else {
        let (consul, s3) = if liveness {
            (watchers.catalog.up(), watchers.object_store.up())
        } else {
            (watchers.catalog.health(), watchers.object_store.health())
        };
        plugins.insert("consul".to_string(), Value::Bool(consul));
        plugins.insert("s3".to_string(), Value::Bool(s3));
    }
    plugins
}

/// `GET /v1/health` — readiness: did every enabled watcher's most recent
/// tick succeed.
pub async fn get_health(Extension(state): Extension<AppState>) -> Response {
    let healthy = state.watchers.all_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": status.as_u16(),
        "plugins": plugin_flags(&state.watchers, false),
    });

    (status, Json(body)).into_response()
}

/// `GET /v1/healthz` — liveness: has every enabled watcher published at
/// least once since start.
pub async fn get_healthz(Extension(state): Extension<AppState>) -> Response {
    let up = state.watchers.all_up();
    let status = if up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let mut body = Map::new();
    body.insert(
        "status".to_string(),
        Value::String(if up { "up" } else { "down" }.to_string()),
    );
    body.extend(plugin_flags(&state.watchers, true));

    (status, Json(Value::Object(body))).into_response()
}
