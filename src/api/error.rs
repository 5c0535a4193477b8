//! HTTP error mapping
//!
//! Every failure leaves the gateway as a JSON body with a short `error`
//! message. Transport errors are logged where they happen and never echoed.

use crate::command::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub const VALIDATION_MESSAGE: &str =
    "Invalid request. Expected JSON body: {\"status\": \"on\" or \"off\"}";
pub const UNAVAILABLE_MESSAGE: &str = "MQTT broker is not connected. Try again later.";
pub const PUBLISH_FAILED_MESSAGE: &str = "Failed to send MQTT message.";

/// Errors surfaced by the publish endpoint
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("broker unavailable")]
    BrokerUnavailable,

    #[error("publish failed")]
    PublishFailed,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BrokerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::PublishFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Validation(e) => ErrorBody {
                error: VALIDATION_MESSAGE,
                details: Some(e.to_string()),
            },
            Self::BrokerUnavailable => ErrorBody {
                error: UNAVAILABLE_MESSAGE,
                details: None,
            },
            Self::PublishFailed => ErrorBody {
                error: PUBLISH_FAILED_MESSAGE,
                details: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
