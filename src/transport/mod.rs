//! Broker client capability
//!
//! The publish pipeline treats the broker as an opaque capability:
//! connect, publish, wait for a delivery confirmation, close. The
//! [`BrokerConnector`] / [`BrokerConnection`] pair is the seam the
//! supervisor drives and the mocks in [`crate::testing`] stand in for.
//!
//! A connection handle is ephemeral: it is exclusively owned by one
//! supervisor loop iteration, recreated on every reconnect, and never
//! shared across tasks.

pub mod mqtt;

use crate::config::PluginConfig;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use mqtt::MqttConnector;

/// Transient failure to reach or handshake with the broker.
///
/// Never fatal: the supervisor retries indefinitely with fixed backoff.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    #[error("broker handshake failed: {0}")]
    Handshake(String),
}

/// A delivery the broker rejected or did not confirm.
///
/// Triggers requeue and reconnect; non-fatal, absorbed by the supervisor.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker rejected publish: {0}")]
    Rejected(String),
    #[error("broker connection lost: {0}")]
    ConnectionLost(String),
    #[error("broker negatively acknowledged delivery")]
    Nacked,
    #[error("no delivery confirmation within {0:?}")]
    ConfirmTimeout(Duration),
}

/// Outcome of waiting for a broker delivery confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    /// Broker accepted the delivery.
    Ack,
    /// Broker refused the delivery.
    Nack,
    /// No answer within the bounded wait.
    TimedOut,
}

/// Identity stamped onto every published message.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishIdentity {
    pub app_id: String,
    pub user_id: String,
}

/// Factory for broker connections. Owned by the supervisor, which calls
/// `connect` on startup and after every delivery failure.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, config: &PluginConfig)
        -> Result<Box<dyn BrokerConnection>, ConnectError>;
}

/// One live broker connection.
#[async_trait]
pub trait BrokerConnection: Send {
    /// Hand one serialized envelope to the broker under `routing_key`.
    async fn publish(
        &mut self,
        routing_key: &str,
        payload: &[u8],
        identity: &PublishIdentity,
    ) -> Result<(), PublishError>;

    /// Wait (bounded) for the broker to confirm the last publish.
    async fn wait_confirm(&mut self, timeout: Duration) -> Confirm;

    /// Close the connection. Errors during teardown are not interesting.
    async fn close(self: Box<Self>);
}
