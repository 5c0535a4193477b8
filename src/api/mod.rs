//! HTTP surface
//!
//! `/api/health` reports broker connectivity, `/api/publish/{topic}` turns a
//! JSON command into an MQTT publish, `/metrics` exposes Prometheus text.

pub mod error;
pub mod health;
pub mod publish;

use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::mqtt::Broker;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub use error::ApiError;
pub use health::{handle_health_check, HealthReport};
pub use publish::{handle_publish, PublishResponse};

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn Broker>,
    pub metrics: GatewayMetrics,
    pub service_name: Arc<str>,
}

/// Create the gateway router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handle_health_check))
        .route("/api/publish/{topic}", post(handle_publish))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Build the CORS policy from `CORS_ALLOWED_ORIGIN`.
///
/// `*` allows any origin without credentials; an explicit comma-separated
/// list allows credentials.
pub fn cors_layer(allowed_origin: &str) -> Result<CorsLayer, GatewayError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origins = allowed_origin
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| GatewayError::Config(format!("invalid CORS origin '{origin}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if origins.is_empty() {
        return Err(GatewayError::Config(
            "CORS_ALLOWED_ORIGIN must not be empty".to_string(),
        ));
    }

    Ok(layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true))
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_mqtt_connected(state.broker.is_connected());

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
