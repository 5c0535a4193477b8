//! MQTT broker integration
//!
//! The HTTP layer depends only on the `Broker` trait; `BrokerConnection` is
//! the production implementation.

mod acks;
mod connection;
mod state;

pub use acks::AckError;
pub use connection::BrokerConnection;
pub use state::{next_state, ConnectionEvent, ConnectionState, Transition};

use crate::error::PublishError;
use async_trait::async_trait;

/// Connection-state query plus acknowledged publish
#[async_trait]
pub trait Broker: Send + Sync {
    /// Latest known connectivity; may be stale by the time the caller acts.
    fn is_connected(&self) -> bool;

    /// Send `payload` on `topic`, resolving once the broker acknowledges it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}
