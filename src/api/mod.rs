pub mod v1;
pub mod v2;

use crate::app_state::AppState;
use crate::config::ApiVersion;
use axum::extract::Request;
use axum::http::header::USER_AGENT;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{error, info};

/// Assemble the router for the configured API surface. Every route is
/// wrapped with request logging and a panic boundary that turns an escaped
/// handler panic into a plain 500.
pub fn router(state: AppState, api: ApiVersion) -> Router {
    let routes = match api {
        ApiVersion::V1 => Router::new()
            .route("/v1/properties/{service}", get(v1::properties::get_properties))
            .route(
                "/v1/properties/{service}/{property}",
                get(v1::properties::get_property),
            )
            .route(
                "/v1/conqueso/{service}",
                get(v1::conqueso::get_properties).post(v1::conqueso::post_properties),
            )
            .route("/v1/health", get(v1::health::get_health))
            .route("/v1/healthz", get(v1::health::get_healthz)),
        ApiVersion::V2 => Router::new()
            .route("/v2/properties/{*scope}", get(v2::properties::get_properties))
            .route("/v2/healthz", get(v2::health::get_healthz)),
    };

    routes
        .layer(middleware::from_fn(request_boundary))
        .layer(Extension(state))
}

/// Request logging plus panic recovery, mirrored from the dispatch-layer
/// guard of the previous deployment: a panicking handler yields a 500 and
/// the process keeps serving.
async fn request_boundary(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let outcome = AssertUnwindSafe(next.run(request)).catch_unwind().await;

    let response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            error!(
                method = %method,
                path = path.as_str(),
                panic = %panic_message(panic.as_ref()),
                "handler panicked"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };

    let elapsed = start.elapsed();
    info!(
        status = response.status().as_u16(),
        method = %method,
        path = path.as_str(),
        duration_ms = format!("{:.3}", elapsed.as_secs_f64() * 1000.0),
        user_agent = user_agent.as_str(),
        "request complete"
    );

    response
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
