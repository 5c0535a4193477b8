//! Domain error types for the MQTT gateway
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns typed errors from this module or from
//! `api::ApiError` at the HTTP boundary.

use thiserror::Error;

/// Gateway domain errors
///
/// Every variant carries structured context fields for diagnostics.
/// On-call engineers can pattern-match on the variant to understand
/// the failure mode without parsing error message strings.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration error (environment variable missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure of the broker connection
    #[error("MQTT connection to {address} failed")]
    MqttConnection {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Prometheus recorder could not be installed
    #[error("metrics recorder installation failed: {0}")]
    Metrics(String),
}

impl GatewayError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `gateway_errors_total` counter.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::MqttConnection { .. } => "mqtt_connection",
            Self::Metrics(_) => "metrics",
        }
    }
}

/// Failure modes of a single publish
///
/// `NotConnected` is detected before anything is sent. `SendFailed` covers
/// everything after: rejected send, connection drop before PUBACK, and an
/// expired acknowledgment deadline.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("MQTT broker is not connected")]
    NotConnected,

    #[error("publish to '{topic}' was not acknowledged")]
    SendFailed {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PublishError {
    pub(crate) fn send_failed(
        topic: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SendFailed {
            topic: topic.to_string(),
            source: source.into(),
        }
    }

    /// Static label for the `outcome` dimension of publish metrics
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::NotConnected => "unavailable",
            Self::SendFailed { .. } => "failed",
        }
    }
}
