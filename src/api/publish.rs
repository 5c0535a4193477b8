//! Publish endpoint
//!
//! Validation runs before the connection is consulted, so a bad request
//! never touches the broker.

use super::{error::ApiError, AppState};
use crate::command::{CommandStatus, PublishCommand, PublishForm, PublishRequest, ValidationError};
use crate::error::PublishError;
use axum::{
    body::Bytes,
    extract::{FromRequest, Path, Request, State},
    http::{header, HeaderMap, HeaderValue},
    Form, Json,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};

pub const SUCCESS_MESSAGE: &str = "Command sent via MQTT";

/// Successful publish response
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub message: &'static str,
    pub topic: String,
    pub status: CommandStatus,
}

pub async fn handle_publish(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    request: Request,
) -> Result<Json<PublishResponse>, ApiError> {
    let command = match decode_command(&topic, request).await {
        Ok(command) => command,
        Err(e) => {
            state.metrics.record_publish_rejected();
            warn!(topic = %topic, error = %e, "Rejected publish request");
            return Err(e.into());
        }
    };

    if !state.broker.is_connected() {
        state
            .metrics
            .record_publish_failure(&PublishError::NotConnected);
        warn!(topic = %topic, "MQTT broker not connected, refusing publish");
        return Err(ApiError::BrokerUnavailable);
    }

    let payload = command.to_payload();
    let started = Instant::now();

    match state.broker.publish(&command.topic, payload).await {
        Ok(()) => {
            state.metrics.record_publish_success(started.elapsed());
            info!(topic = %command.topic, status = %command.status, "Published command");
            Ok(Json(PublishResponse {
                message: SUCCESS_MESSAGE,
                topic: command.topic,
                status: command.status,
            }))
        }
        Err(e) => {
            state.metrics.record_publish_failure(&e);
            error!(topic = %command.topic, error = %e, "Failed to publish command");
            Err(ApiError::PublishFailed)
        }
    }
}

/// Body encodings accepted by the publish endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

/// Decode a JSON or URL-encoded body into a validated command
async fn decode_command(
    topic: &str,
    mut request: Request,
) -> Result<PublishCommand, ValidationError> {
    if body_kind(request.headers())? == BodyKind::Form {
        // axum's form extractor compares the media type case-sensitively
        request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let Form(form) = Form::<PublishForm>::from_request(request, &())
            .await
            .map_err(|_| ValidationError::MalformedBody)?;
        return PublishCommand::from_form(topic, &form);
    }

    let body = Bytes::from_request(request, &())
        .await
        .map_err(|_| ValidationError::MalformedBody)?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MissingStatus);
    }

    // Only a JSON object is a valid body; serde would also accept a
    // positional array for a struct.
    let value: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| ValidationError::MalformedBody)?;
    if !value.is_object() {
        return Err(ValidationError::MalformedBody);
    }
    let parsed: PublishRequest =
        serde_json::from_value(value).map_err(|_| ValidationError::MalformedBody)?;
    PublishCommand::from_json(topic, &parsed)
}

/// Classify the body by media type; a missing content type means JSON.
fn body_kind(headers: &HeaderMap) -> Result<BodyKind, ValidationError> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(BodyKind::Json);
    };
    let raw = value
        .to_str()
        .map_err(|_| ValidationError::UnsupportedContentType("<non-ascii>".to_string()))?;
    let essence = raw.split(';').next().unwrap_or_default().trim();

    if essence.eq_ignore_ascii_case("application/json") {
        Ok(BodyKind::Json)
    } else if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Ok(BodyKind::Form)
    } else {
        Err(ValidationError::UnsupportedContentType(essence.to_string()))
    }
}
