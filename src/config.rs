//! Gateway configuration module
//!
//! Handles loading configuration from environment variables (and `.env`).

use crate::error::GatewayError;
use std::env;
use std::fmt;
use std::time::Duration;

/// Broker network address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// MQTT session settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub client_id: String,

    /// Applied only when both are present
    pub username: Option<String>,
    pub password: Option<String>,

    pub keep_alive: Duration,

    /// Fixed delay between a connection failure and the next attempt
    pub reconnect_delay: Duration,

    /// Deadline for the broker's PUBACK
    pub publish_timeout: Duration,
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub broker: BrokerAddress,

    pub mqtt: MqttSettings,

    /// HTTP listener port
    pub http_port: u16,

    /// Service name reported by the health check
    pub service_name: String,

    /// Allowed CORS origins: "*" or a comma-separated list
    pub cors_allowed_origin: String,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

const MIN_KEEP_ALIVE_SECS: u64 = 5;
const MIN_INTERVAL_MS: u64 = 100;
const MAX_INTERVAL_MS: u64 = 600_000;

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("MQTT_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        if host.trim().is_empty() {
            return Err(GatewayError::Config("MQTT_HOST must not be empty".to_string()));
        }

        let port = parse_or(&lookup, "MQTT_PORT", 1883u16)?;

        let client_id = lookup("MQTT_CLIENT_ID")
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(default_client_id);
        if client_id.starts_with(' ') {
            return Err(GatewayError::Config(
                "MQTT_CLIENT_ID must not start with a space".to_string(),
            ));
        }

        let keep_alive_secs = parse_or(&lookup, "MQTT_KEEP_ALIVE_SECS", 30u64)?;
        if keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(GatewayError::Config(format!(
                "MQTT_KEEP_ALIVE_SECS must be at least {MIN_KEEP_ALIVE_SECS}"
            )));
        }

        let reconnect_delay_ms = parse_or(&lookup, "MQTT_RECONNECT_DELAY_MS", 5_000u64)?;
        validate_interval("MQTT_RECONNECT_DELAY_MS", reconnect_delay_ms)?;

        let publish_timeout_ms = parse_or(&lookup, "PUBLISH_TIMEOUT_MS", 5_000u64)?;
        validate_interval("PUBLISH_TIMEOUT_MS", publish_timeout_ms)?;

        let http_port = parse_or(&lookup, "HTTP_PORT", 4000u16)?;

        Ok(Self {
            broker: BrokerAddress { host, port },
            mqtt: MqttSettings {
                client_id,
                username: lookup("MQTT_USERNAME").filter(|v| !v.is_empty()),
                password: lookup("MQTT_PASSWORD").filter(|v| !v.is_empty()),
                keep_alive: Duration::from_secs(keep_alive_secs),
                reconnect_delay: Duration::from_millis(reconnect_delay_ms),
                publish_timeout: Duration::from_millis(publish_timeout_ms),
            },
            http_port,
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "MQTT API Gateway".to_string()),
            cors_allowed_origin: lookup("CORS_ALLOWED_ORIGIN").unwrap_or_else(|| "*".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, GatewayError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| GatewayError::Config(format!("{key} must be a valid number: {e}"))),
        None => Ok(default),
    }
}

fn validate_interval(key: &str, value_ms: u64) -> Result<(), GatewayError> {
    if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&value_ms) {
        return Err(GatewayError::Config(format!(
            "{key} must be between {MIN_INTERVAL_MS} and {MAX_INTERVAL_MS} ms"
        )));
    }
    Ok(())
}

fn default_client_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("mqtt-gateway-{}", &suffix[..8])
}
