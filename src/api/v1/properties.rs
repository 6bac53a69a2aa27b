use crate::app_state::AppState;
use crate::domain::{EndpointMap, DISCOVERY_KEY};
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::Value;
use tracing::warn;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

fn endpoints_json(endpoints: EndpointMap) -> Value {
    Value::Object(
        endpoints
            .into_iter()
            .map(|(service, addresses)| {
                (
                    service,
                    Value::Array(addresses.into_iter().map(Value::String).collect()),
                )
            })
            .collect(),
    )
}

/// `GET /v1/properties/{service}` — the service's bundle merged with the
/// discovery endpoint map under the reserved `consul` key.
pub async fn get_properties(
    Extension(state): Extension<AppState>,
    Path(service): Path<String>,
) -> Response {
    let key = state.service_key(&service);
    let Some(bundle) = state.cache.bundle(&key) else {
        warn!(service = service.as_str(), "no properties cached for service");
        return StatusCode::OK.into_response();
    };

    let mut combined = serde_json::Map::new();
    for (name, value) in bundle {
        combined.insert(name, value.into());
    }

    let endpoints = state.cache.endpoints(DISCOVERY_KEY).unwrap_or_default();
    combined.insert(DISCOVERY_KEY.to_string(), endpoints_json(endpoints));

    Json(Value::Object(combined)).into_response()
}

/// `GET /v1/properties/{service}/{property}` — one property, stringified.
/// Unknown services and properties answer with a literal `{}`.
pub async fn get_property(
    Extension(state): Extension<AppState>,
    Path((service, property)): Path<(String, String)>,
) -> Response {
    let key = state.service_key(&service);
    let bundle = state.cache.bundle(&key).unwrap_or_default();

    let line = match bundle.get(&property) {
        Some(value) => value.render_scalar().unwrap_or_else(|| {
            warn!(
                service = service.as_str(),
                property = property.as_str(),
                kind = value.type_name(),
                "property has no plain-text form"
            );
            "{}".to_string()
        }),
        None => "{}".to_string(),
    };

    ([(header::CONTENT_TYPE, TEXT_PLAIN)], line).into_response()
}
