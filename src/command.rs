//! Publish command validation and wire serialization
//!
//! Converts an HTTP topic parameter plus request body into the JSON payload
//! published on the broker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// MQTT topic names are length-prefixed with a u16
const MAX_TOPIC_BYTES: usize = 65_535;

/// Requested switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    On,
    Off,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("on") {
            Ok(Self::On)
        } else if s.eq_ignore_ascii_case("off") {
            Ok(Self::Off)
        } else {
            Err(ValidationError::InvalidStatus(s.to_string()))
        }
    }
}

/// Why a publish request was rejected before reaching the broker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request body could not be decoded")]
    MalformedBody,

    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    #[error("missing 'status' field")]
    MissingStatus,

    #[error("'status' must be a string")]
    StatusNotString,

    #[error("unrecognized status '{0}'")]
    InvalidStatus(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(&'static str),
}

/// Raw JSON request body; `status` stays untyped so that numbers, booleans
/// and nulls surface as validation errors instead of decode failures.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub status: Option<serde_json::Value>,
}

/// URL-encoded form body
#[derive(Debug, Deserialize)]
pub struct PublishForm {
    #[serde(default)]
    pub status: Option<String>,
}

/// A validated command, serialized as the broker payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishCommand {
    pub topic: String,
    pub status: CommandStatus,
}

impl PublishCommand {
    /// Validate a JSON request body against the path topic.
    ///
    /// Status is checked first, then the topic.
    pub fn from_json(topic: &str, request: &PublishRequest) -> Result<Self, ValidationError> {
        let status = match &request.status {
            None | Some(serde_json::Value::Null) => return Err(ValidationError::MissingStatus),
            Some(serde_json::Value::String(s)) => s.as_str(),
            Some(_) => return Err(ValidationError::StatusNotString),
        };
        Self::new(topic, status)
    }

    /// Validate a form body against the path topic.
    pub fn from_form(topic: &str, form: &PublishForm) -> Result<Self, ValidationError> {
        let status = form
            .status
            .as_deref()
            .ok_or(ValidationError::MissingStatus)?;
        Self::new(topic, status)
    }

    pub fn new(topic: &str, status: &str) -> Result<Self, ValidationError> {
        if status.is_empty() {
            return Err(ValidationError::MissingStatus);
        }
        let status = status.parse()?;
        validate_topic(topic)?;
        Ok(Self {
            topic: topic.to_string(),
            status,
        })
    }

    /// Serialize to the broker wire format: `{"topic":..,"status":"ON"|"OFF"}`
    pub fn to_payload(&self) -> Vec<u8> {
        // Two plain string fields; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::InvalidTopic("topic must not be empty"));
    }
    if topic.len() > MAX_TOPIC_BYTES {
        return Err(ValidationError::InvalidTopic("topic exceeds 65535 bytes"));
    }
    if topic.contains(['+', '#']) {
        return Err(ValidationError::InvalidTopic(
            "wildcards are not allowed in publish topics",
        ));
    }
    if topic.contains('\0') {
        return Err(ValidationError::InvalidTopic("topic must not contain NUL"));
    }
    Ok(())
}
