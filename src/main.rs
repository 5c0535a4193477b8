//! MQTT Gateway
//!
//! Bridges HTTP commands onto an MQTT broker:
//! - Keeps one MQTT session alive, retrying forever with a fixed delay
//! - Publishes validated on/off commands and waits for the broker's PUBACK
//! - Exposes health and Prometheus metrics endpoints

use anyhow::Result;
use mqtt_gateway::api::{self, AppState};
use mqtt_gateway::config::GatewayConfig;
use mqtt_gateway::metrics::GatewayMetrics;
use mqtt_gateway::mqtt::BrokerConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let gateway_config = GatewayConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("mqtt_gateway={}", gateway_config.log_level).parse()?)
                .add_directive("rumqttc=warn".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        broker = %gateway_config.broker,
        client_id = %gateway_config.mqtt.client_id,
        "Starting MQTT gateway"
    );

    let metrics = GatewayMetrics::install()?;
    info!("Prometheus metrics initialized");

    let broker = BrokerConnection::new(gateway_config.mqtt.clone(), metrics.clone());
    broker.connect(gateway_config.broker.clone());

    let app_state = AppState {
        broker: broker.clone(),
        metrics,
        service_name: Arc::from(gateway_config.service_name.as_str()),
    };

    let app = api::router(app_state)
        .layer(api::cors_layer(&gateway_config.cors_allowed_origin)?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = ([0, 0, 0, 0], gateway_config.http_port).into();
    info!(
        port = gateway_config.http_port,
        cors_allowed_origin = %gateway_config.cors_allowed_origin,
        "Starting HTTP server"
    );

    let http_server = axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = http_server.await {
        error!(error = %e, "HTTP server error");
    }

    info!("Shutting down gateway...");
    broker.close().await;

    info!("Gateway shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
