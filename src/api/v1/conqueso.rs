use crate::api::v1::properties::TEXT_PLAIN;
use crate::app_state::AppState;
use crate::domain::DISCOVERY_KEY;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tracing::warn;

/// `GET /v1/conqueso/{service}` — Java-properties rendering: one
/// `conqueso.<svc>.ips=` line per discovered service followed by one
/// `<key>=<value>` line per property.
pub async fn get_properties(
    Extension(state): Extension<AppState>,
    Path(service): Path<String>,
) -> Response {
    let key = state.service_key(&service);
    let bundle = state.cache.bundle(&key).unwrap_or_default();
    let endpoints = state.cache.endpoints(DISCOVERY_KEY).unwrap_or_default();

    let mut output = String::new();

    for (discovered, addresses) in endpoints {
        output.push_str("conqueso.");
        output.push_str(&discovered);
        output.push_str(".ips=");
        output.push_str(&addresses.join(","));
        output.push('\n');
    }

    for (name, value) in &bundle {
        match value.render_scalar() {
            Some(rendered) => {
                output.push_str(name);
                output.push('=');
                output.push_str(&rendered);
                output.push('\n');
            }
            None => {
                warn!(
                    service = service.as_str(),
                    property = name.as_str(),
                    kind = value.type_name(),
                    "property has no conqueso line form"
                );
            }
        }
    }

    ([(header::CONTENT_TYPE, TEXT_PLAIN)], output).into_response()
}

/// `POST /v1/conqueso/{service}` — accepted and ignored; conqueso clients
/// push instance metadata here that this service has no use for.
pub async fn post_properties() -> StatusCode {
    StatusCode::OK
}
