//! Health check endpoint

use super::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Point-in-time view of broker connectivity, computed per request
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: String,
    pub mqtt_status: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<&'static str>,
}

impl HealthReport {
    pub fn new(service: &str, mqtt_connected: bool, at: DateTime<Utc>) -> Self {
        let timestamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        if mqtt_connected {
            Self {
                status: "ok",
                service: service.to_string(),
                mqtt_status: "Connected",
                timestamp,
                error_details: None,
            }
        } else {
            Self {
                status: "error",
                service: service.to_string(),
                mqtt_status: "Disconnected",
                timestamp,
                error_details: Some("Failed to connect to MQTT broker."),
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error_details.is_none()
    }
}

/// Health endpoint - 200 when the broker link is up, 503 otherwise
pub async fn handle_health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = HealthReport::new(&state.service_name, state.broker.is_connected(), Utc::now());

    if report.is_healthy() {
        (StatusCode::OK, Json(report))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(report))
    }
}
