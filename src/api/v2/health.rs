use crate::app_state::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{Map, Value};

/// `GET /v2/healthz` — liveness over the enabled source watcher.
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
    if state.watchers.directory.enabled() {
        body.insert("file".to_string(), Value::Bool(state.watchers.directory.up()));
    } else {
        body.insert(
            "s3".to_string(),
            Value::Bool(state.watchers.object_store.up()),
        );
    }

    (status, Json(Value::Object(body))).into_response()
}
