//! HTTP contract tests
//!
//! Drives the router with `tower::ServiceExt::oneshot` against a recording
//! `Broker` double, so every request-to-broker mapping is observable.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use mqtt_gateway::api::{self, AppState};
use mqtt_gateway::error::PublishError;
use mqtt_gateway::metrics::GatewayMetrics;
use mqtt_gateway::mqtt::Broker;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Clone, Copy)]
enum PublishOutcome {
    Ack,
    SendFailed,
    /// Connection dropped between the handler's check and the send
    NotConnected,
}

struct RecordingBroker {
    connected: AtomicBool,
    outcome: PublishOutcome,
    connectivity_checks: AtomicUsize,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingBroker {
    fn new(connected: bool, outcome: PublishOutcome) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
            outcome,
            connectivity_checks: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        })
    }

    fn published(&self) -> Vec<(String, Value)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, payload)| (topic.clone(), serde_json::from_slice(payload).unwrap()))
            .collect()
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    fn is_connected(&self) -> bool {
        self.connectivity_checks.fetch_add(1, Ordering::SeqCst);
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        match self.outcome {
            PublishOutcome::Ack => Ok(()),
            PublishOutcome::SendFailed => Err(PublishError::SendFailed {
                topic: topic.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "socket closed by peer 10.0.0.7",
                )),
            }),
            PublishOutcome::NotConnected => Err(PublishError::NotConnected),
        }
    }
}

fn app(broker: Arc<RecordingBroker>) -> Router {
    api::router(AppState {
        broker,
        metrics: GatewayMetrics::detached(),
        service_name: Arc::from("MQTT API Gateway"),
    })
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn publish_json(topic: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/publish/{topic}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn health() -> Request<Body> {
    Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn publish_on_while_connected_reaches_broker() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);

    let (status, body) = send(app(broker.clone()), publish_json("lamp", r#"{"status":"on"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "lamp");
    assert_eq!(body["status"], "ON");
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    assert_eq!(
        broker.published(),
        vec![("lamp".to_string(), json!({"topic": "lamp", "status": "ON"}))]
    );
}

#[tokio::test]
async fn status_is_normalized_to_uppercase() {
    for (raw, wire) in [("on", "ON"), ("ON", "ON"), ("off", "OFF"), ("OfF", "OFF")] {
        let broker = RecordingBroker::new(true, PublishOutcome::Ack);
        let body = json!({ "status": raw }).to_string();

        let (status, response) = send(app(broker.clone()), publish_json("lamp", &body)).await;

        assert_eq!(status, StatusCode::OK, "status {raw}");
        assert_eq!(response["status"], wire);
        assert_eq!(broker.published()[0].1["status"], wire);
    }
}

#[tokio::test]
async fn invalid_status_is_rejected_without_touching_broker() {
    let bodies = [
        r#"{"status":"purple"}"#,
        r#"{}"#,
        r#"{"status":null}"#,
        r#"{"status":1}"#,
        r#"{"status":""}"#,
        r#"{"state":"on"}"#,
        r#"not json"#,
        r#"["on"]"#,
        "",
    ];

    for body in bodies {
        let broker = RecordingBroker::new(true, PublishOutcome::Ack);

        let (status, response) = send(app(broker.clone()), publish_json("lamp", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert!(response["error"].is_string());
        assert!(broker.published().is_empty());
        assert_eq!(
            broker.connectivity_checks.load(Ordering::SeqCst),
            0,
            "validation must not query the connection"
        );
    }
}

#[tokio::test]
async fn wildcard_topic_is_rejected() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);

    // %23 decodes to '#'
    let (status, _) = send(app(broker.clone()), publish_json("lamp%23", r#"{"status":"on"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn disconnected_broker_yields_503_without_publish() {
    let broker = RecordingBroker::new(false, PublishOutcome::Ack);

    let (status, body) = send(app(broker.clone()), publish_json("lamp", r#"{"status":"off"}"#)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn send_failure_yields_500_without_leaking_details() {
    let broker = RecordingBroker::new(true, PublishOutcome::SendFailed);

    let (status, body) = send(app(broker.clone()), publish_json("lamp", r#"{"status":"on"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let object = body.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object.contains_key("error"));
    let text = body.to_string();
    assert!(!text.contains("10.0.0.7"));
    assert!(!text.contains("socket"));
    assert_eq!(broker.published().len(), 1);
}

#[tokio::test]
async fn connection_lost_after_check_yields_500() {
    let broker = RecordingBroker::new(true, PublishOutcome::NotConnected);

    let (status, body) = send(app(broker.clone()), publish_json("lamp", r#"{"status":"on"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let object = body.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object.contains_key("error"));
    assert_eq!(broker.published().len(), 1);
}

#[tokio::test]
async fn body_without_content_type_is_read_as_json() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);
    let request = Request::builder()
        .method("POST")
        .uri("/api/publish/lamp")
        .body(Body::from(r#"{"status":"off"}"#))
        .unwrap();

    let (status, body) = send(app(broker.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OFF");
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);
    let request = Request::builder()
        .method("POST")
        .uri("/api/publish/lamp")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"status":"on"}"#))
        .unwrap();

    let (status, body) = send(app(broker.clone()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(broker.published().is_empty());
    assert_eq!(broker.connectivity_checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn form_content_type_is_matched_case_insensitively() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);
    let request = Request::builder()
        .method("POST")
        .uri("/api/publish/lamp")
        .header(header::CONTENT_TYPE, "Application/X-WWW-Form-Urlencoded")
        .body(Body::from("status=on"))
        .unwrap();

    let (status, body) = send(app(broker.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ON");
}

#[tokio::test]
async fn topic_is_echoed_exactly() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);

    let (status, body) = send(
        app(broker.clone()),
        publish_json("Kitchen_Lamp-2", r#"{"status":"off"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "Kitchen_Lamp-2");
    assert_eq!(broker.published()[0].0, "Kitchen_Lamp-2");
}

#[tokio::test]
async fn form_encoded_body_is_accepted() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);
    let request = Request::builder()
        .method("POST")
        .uri("/api/publish/lamp")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("status=Off"))
        .unwrap();

    let (status, body) = send(app(broker.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OFF");
    assert_eq!(broker.published()[0].1, json!({"topic": "lamp", "status": "OFF"}));
}

#[tokio::test]
async fn health_reports_connected() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);

    let (status, body) = send(app(broker.clone()), health()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "MQTT API Gateway");
    assert_eq!(body["mqtt_status"], "Connected");
    assert!(body["timestamp"].is_string());
    assert!(body.get("error_details").is_none());
}

#[tokio::test]
async fn health_reports_disconnected_with_503() {
    let broker = RecordingBroker::new(false, PublishOutcome::Ack);

    let (status, body) = send(app(broker.clone()), health()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
    assert_eq!(body["mqtt_status"], "Disconnected");
    assert!(body["error_details"].is_string());
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn health_follows_connectivity_changes() {
    let broker = RecordingBroker::new(false, PublishOutcome::Ack);
    let router = app(broker.clone());

    let (status, _) = send(router.clone(), health()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    broker.connected.store(true, Ordering::SeqCst);
    let (status, _) = send(router, health()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);
    let request = Request::builder()
        .uri("/api/unknown")
        .body(Body::empty())
        .unwrap();

    let response = app(broker).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_serves_text() {
    let broker = RecordingBroker::new(true, PublishOutcome::Ack);
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();

    let response = app(broker).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
}
