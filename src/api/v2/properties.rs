use crate::app_state::AppState;
use crate::kv::CacheValue;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde_json::Value;
use tracing::error;

const APPLICATION_JSON: &str = "application/json";

fn json_body(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, APPLICATION_JSON)], body).into_response()
}

/// `GET /v2/properties/{scope}` — the first scope segment selects a cached
/// document; the remaining segments index into its `properties` tree, each
/// segment naming one literal key (embedded dots included). The selected
/// fragment is returned as JSON, strings raw; a missing inner path yields
/// an empty body and a missing document a 404.
pub async fn get_properties(
    Extension(state): Extension<AppState>,
    Path(scope): Path<String>,
) -> Response {
    let mut segments = scope.split('/');
    let service = segments.next().unwrap_or_default();
    let path: Vec<&str> = segments.filter(|segment| !segment.is_empty()).collect();

    let Some(entry) = state.cache.load(service) else {
        return json_body(StatusCode::NOT_FOUND, "{}".to_string());
    };
    let CacheValue::Document(blob) = entry.as_ref() else {
        return json_body(StatusCode::NOT_FOUND, "{}".to_string());
    };

    let document: Value = match serde_json::from_slice(blob) {
        Ok(document) => document,
        Err(err) => {
            error!(service, error = %err, "cached document is not valid JSON");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(properties) = document.get("properties") else {
        return json_body(StatusCode::OK, String::new());
    };

    let selected = path
        .iter()
        .try_fold(properties, |node, segment| node.get(*segment));

    let rendered = match selected {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(fragment) => fragment.to_string(),
        None => String::new(),
    };

    json_body(StatusCode::OK, rendered)
}
