//! MQTT Gateway - HTTP to MQTT command bridge
//!
//! Accepts on/off commands over HTTP, publishes them to an MQTT broker with
//! QoS 1 acknowledgment, and reports broker connectivity for health checks.

pub mod api;
pub mod command;
pub mod config;
pub mod error;
pub mod metrics;
pub mod mqtt;
