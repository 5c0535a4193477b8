//! Broker connection driver
//!
//! Owns the single MQTT session of the process. A background task drives the
//! rumqttc event loop, feeds connection events through the state machine and
//! retries forever with a fixed delay after any transport failure.

use super::acks::{AckError, PendingAcks};
use super::state::{ConnectionEvent, ConnectionState, SharedState, Transition};
use super::Broker;
use crate::config::{BrokerAddress, MqttSettings};
use crate::error::{GatewayError, PublishError};
use crate::metrics::GatewayMetrics;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Request channel capacity between client handles and the event loop.
///
/// Also the number of publishes that may be outstanding at once, so a
/// burst waits for room instead of overflowing the channel.
const REQUEST_CAPACITY: usize = 64;

/// How long `close` waits for the DISCONNECT to be flushed
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// The process-wide MQTT connection
pub struct BrokerConnection {
    settings: MqttSettings,
    state: SharedState,
    client: Mutex<Option<AsyncClient>>,
    acks: PendingAcks,
    send_permits: Semaphore,
    driver: Mutex<Option<JoinHandle<()>>>,
    closing: AtomicBool,
    reconnects: AtomicU64,
    metrics: GatewayMetrics,
}

impl BrokerConnection {
    pub fn new(settings: MqttSettings, metrics: GatewayMetrics) -> Arc<Self> {
        Arc::new(Self {
            settings,
            state: SharedState::new(),
            client: Mutex::new(None),
            acks: PendingAcks::new(),
            send_permits: Semaphore::new(REQUEST_CAPACITY),
            driver: Mutex::new(None),
            closing: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
            metrics,
        })
    }

    /// Start the connection driver for `address`.
    ///
    /// Returns false if a driver is already running; the existing session is
    /// left untouched.
    pub fn connect(self: &Arc<Self>, address: BrokerAddress) -> bool {
        let mut driver = lock(&self.driver);
        if driver.is_some() {
            warn!(%address, "MQTT connection already started, ignoring connect");
            return false;
        }

        let this = Arc::clone(self);
        *driver = Some(tokio::spawn(async move { this.run(address).await }));
        true
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of reconnects scheduled since start
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Publish `payload` on `topic` with QoS 1 and wait for the PUBACK.
    ///
    /// Waiting for a free send slot counts against the same deadline as the
    /// acknowledgment.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }

        let deadline = Instant::now() + self.settings.publish_timeout;
        let _permit = match timeout_at(deadline, self.send_permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(closed)) => return Err(PublishError::send_failed(topic, closed)),
            Err(elapsed) => {
                warn!(topic, "Timed out waiting for a free publish slot");
                return Err(PublishError::send_failed(topic, elapsed));
            }
        };

        let ack = {
            let guard = lock(&self.client);
            let client = guard.as_ref().ok_or(PublishError::NotConnected)?;
            let ack = self.acks.enqueue();
            if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, false, payload) {
                self.acks.cancel_last();
                warn!(topic, error = %e, "MQTT client rejected publish");
                return Err(PublishError::send_failed(topic, e));
            }
            ack
        };

        match timeout_at(deadline, ack).await {
            Ok(Ok(Ok(()))) => {
                debug!(topic, "Publish acknowledged");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(PublishError::send_failed(topic, e)),
            Ok(Err(_)) => Err(PublishError::send_failed(topic, AckError::ConnectionLost)),
            Err(elapsed) => {
                warn!(
                    topic,
                    timeout_ms = self.settings.publish_timeout.as_millis() as u64,
                    "Publish acknowledgment timed out"
                );
                Err(PublishError::send_failed(topic, elapsed))
            }
        }
    }

    /// Graceful shutdown: send DISCONNECT and stop the driver
    pub async fn close(&self) {
        info!("Closing MQTT connection");
        self.closing.store(true, Ordering::SeqCst);

        if let Some(client) = lock(&self.client).as_ref() {
            if let Err(e) = client.try_disconnect() {
                debug!(error = %e, "DISCONNECT could not be queued");
            }
        }

        let handle = lock(&self.driver).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        self.acks.fail_all();
        self.metrics.set_mqtt_connected(false);
    }

    async fn run(self: Arc<Self>, address: BrokerAddress) {
        self.transition(ConnectionEvent::ConnectStarted);

        loop {
            let (client, mut eventloop) =
                AsyncClient::new(self.mqtt_options(&address), REQUEST_CAPACITY);
            *lock(&self.client) = Some(client);
            info!(%address, client_id = %self.settings.client_id, "Connecting to MQTT broker");

            let failure = loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("DISCONNECT sent to MQTT broker");
                        lock(&self.client).take();
                        return;
                    }
                    Ok(event) => self.handle_event(event),
                    Err(e) => break e,
                }
            };

            if self.closing.load(Ordering::SeqCst) {
                lock(&self.client).take();
                self.acks.fail_all();
                debug!(error = %failure, "MQTT event loop stopped during shutdown");
                return;
            }

            // Waiters released below must already see Failing
            let transition = self.transition(ConnectionEvent::TransportError);
            lock(&self.client).take();
            let abandoned = self.acks.fail_all();

            let cause = failure.to_string();
            let err = GatewayError::MqttConnection {
                address: address.to_string(),
                source: Box::new(failure),
            };
            self.metrics.record_error(&err);
            error!(
                error = %err,
                cause = %cause,
                abandoned_publishes = abandoned,
                "MQTT connection error"
            );

            if transition.arm_retry {
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_reconnect();
            }

            warn!(
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "Retrying MQTT connection after fixed delay"
            );
            tokio::time::sleep(self.settings.reconnect_delay).await;
            self.transition(ConnectionEvent::RetryElapsed);
        }
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                self.transition(ConnectionEvent::ConnAck);
                info!(session_present = ack.session_present, "Connected to MQTT broker");
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => self.acks.on_outgoing(pkid),
            Event::Incoming(Packet::PubAck(ack)) => self.acks.on_puback(ack.pkid),
            Event::Incoming(Packet::Disconnect) => {
                warn!("MQTT broker sent DISCONNECT");
            }
            other => debug!(event = ?other, "MQTT event"),
        }
    }

    fn transition(&self, event: ConnectionEvent) -> Transition {
        let transition = self.state.apply(event);
        if transition.from != transition.to {
            debug!(
                from = transition.from.as_str(),
                to = transition.to.as_str(),
                ?event,
                "MQTT connection state changed"
            );
        }
        self.metrics
            .set_mqtt_connected(transition.to == ConnectionState::Connected);
        transition
    }

    fn mqtt_options(&self, address: &BrokerAddress) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            address.host.clone(),
            address.port,
        );
        options.set_keep_alive(self.settings.keep_alive);
        options.set_clean_session(true);

        if let (Some(username), Some(password)) = (&self.settings.username, &self.settings.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        options
    }
}

#[async_trait]
impl Broker for BrokerConnection {
    fn is_connected(&self) -> bool {
        BrokerConnection::is_connected(self)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        BrokerConnection::publish(self, topic, payload).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
