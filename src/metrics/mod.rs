//! Prometheus metrics module

use crate::error::{GatewayError, PublishError};
use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Gateway metrics collector
#[derive(Clone)]
pub struct GatewayMetrics {
    handle: Arc<PrometheusHandle>,
}

impl GatewayMetrics {
    /// Install the global Prometheus recorder and return a render handle
    pub fn install() -> Result<Self, GatewayError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| GatewayError::Metrics(e.to_string()))?;

        Self::register_metrics();

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// A handle backed by a recorder that is not installed globally.
    ///
    /// Recording calls are no-ops unless some other recorder is installed;
    /// used where several gateways share one process, such as tests.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: Arc::new(recorder.handle()),
        }
    }

    fn register_metrics() {
        describe_counter!(
            "gateway_publish_total",
            Unit::Count,
            "Publish requests by outcome"
        );
        describe_counter!(
            "gateway_mqtt_reconnects_total",
            Unit::Count,
            "Reconnect attempts scheduled after a connection failure"
        );
        describe_counter!(
            "gateway_errors_total",
            Unit::Count,
            "Total gateway errors"
        );

        describe_histogram!(
            "gateway_publish_duration_seconds",
            Unit::Seconds,
            "Time from publish request to broker acknowledgment"
        );

        describe_gauge!(
            "gateway_mqtt_connected",
            Unit::Count,
            "MQTT connection status (1=connected, 0=disconnected)"
        );
    }

    /// Record an acknowledged publish
    pub fn record_publish_success(&self, duration: Duration) {
        counter!("gateway_publish_total", "outcome" => "success").increment(1);
        histogram!("gateway_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a publish that failed at or after the connection check
    pub fn record_publish_failure(&self, error: &PublishError) {
        counter!("gateway_publish_total", "outcome" => error.outcome_label()).increment(1);
    }

    /// Record a request rejected by validation
    pub fn record_publish_rejected(&self) {
        counter!("gateway_publish_total", "outcome" => "rejected").increment(1);
    }

    /// Record a scheduled reconnect
    pub fn record_reconnect(&self) {
        counter!("gateway_mqtt_reconnects_total").increment(1);
    }

    /// Record gateway error
    pub fn record_error(&self, error: &GatewayError) {
        counter!("gateway_errors_total", "error_type" => error.error_type_label()).increment(1);
    }

    /// Set MQTT connection status
    pub fn set_mqtt_connected(&self, connected: bool) {
        gauge!("gateway_mqtt_connected").set(if connected { 1.0 } else { 0.0 });
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
