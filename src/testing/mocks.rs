//! Mock implementations for testing
//!
//! Provides a scriptable in-memory broker and audit sinks so the queue,
//! supervisor, and facade can be exercised end to end without external
//! dependencies.

use crate::config::PluginConfig;
use crate::protocol::Envelope;
use crate::sink::{AuditSink, SinkError};
use crate::transport::{
    BrokerConnection, BrokerConnector, Confirm, ConnectError, PublishError, PublishIdentity,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A payload the mock broker has confirmed: `(routing_key, bytes)`.
pub type DeliveredMessage = (String, Vec<u8>);

#[derive(Debug, Default)]
struct BrokerState {
    connect_failures_remaining: Mutex<u32>,
    connect_attempts: Mutex<u32>,
    publish_attempts: Mutex<u32>,
    closed_connections: Mutex<u32>,
    confirm_script: Mutex<VecDeque<Confirm>>,
    delivered: Mutex<Vec<DeliveredMessage>>,
    identities: Mutex<Vec<PublishIdentity>>,
}

/// Scriptable in-memory broker.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the supervisor owns another. Confirm outcomes are consumed from a
/// script, defaulting to `Ack` once the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    state: Arc<BrokerState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts with a transient error.
    pub fn with_connect_failures(self, n: u32) -> Self {
        *self.state.connect_failures_remaining.lock().unwrap() = n;
        self
    }

    /// Script the outcomes of the next confirm waits, in order.
    pub fn with_confirms(self, confirms: Vec<Confirm>) -> Self {
        *self.state.confirm_script.lock().unwrap() = confirms.into();
        self
    }

    /// Make the broker reachable again.
    pub fn clear_connect_failures(&self) {
        *self.state.connect_failures_remaining.lock().unwrap() = 0;
    }

    pub fn connect_attempts(&self) -> u32 {
        *self.state.connect_attempts.lock().unwrap()
    }

    pub fn publish_attempts(&self) -> u32 {
        *self.state.publish_attempts.lock().unwrap()
    }

    pub fn closed_connections(&self) -> u32 {
        *self.state.closed_connections.lock().unwrap()
    }

    /// Messages the broker confirmed, in delivery order.
    pub fn delivered(&self) -> Vec<DeliveredMessage> {
        self.state.delivered.lock().unwrap().clone()
    }

    /// Identities attached to publish attempts, in order.
    pub fn identities(&self) -> Vec<PublishIdentity> {
        self.state.identities.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerConnector for MockBroker {
    async fn connect(
        &self,
        _config: &PluginConfig,
    ) -> Result<Box<dyn BrokerConnection>, ConnectError> {
        *self.state.connect_attempts.lock().unwrap() += 1;
        {
            let mut remaining = self.state.connect_failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ConnectError::Unreachable("mock broker down".to_string()));
            }
        }
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            in_flight: None,
        }))
    }
}

struct MockConnection {
    state: Arc<BrokerState>,
    in_flight: Option<DeliveredMessage>,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn publish(
        &mut self,
        routing_key: &str,
        payload: &[u8],
        identity: &PublishIdentity,
    ) -> Result<(), PublishError> {
        *self.state.publish_attempts.lock().unwrap() += 1;
        self.state.identities.lock().unwrap().push(identity.clone());
        self.in_flight = Some((routing_key.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn wait_confirm(&mut self, _timeout: Duration) -> Confirm {
        let outcome = self
            .state
            .confirm_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Confirm::Ack);
        let message = self.in_flight.take();
        if outcome == Confirm::Ack {
            if let Some(message) = message {
                self.state.delivered.lock().unwrap().push(message);
            }
        }
        outcome
    }

    async fn close(self: Box<Self>) {
        *self.state.closed_connections.lock().unwrap() += 1;
    }
}

/// Audit sink that records envelopes in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Envelope>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes logged so far, in call order.
    pub fn logged(&self) -> Vec<Envelope> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for MemorySink {
    fn log(&self, envelope: &Envelope) -> Result<(), SinkError> {
        self.entries.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Audit sink that always fails, for exercising the fire-and-forget path.
#[derive(Debug)]
pub struct FailingSink;

impl AuditSink for FailingSink {
    fn log(&self, _envelope: &Envelope) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::other("mock sink failure")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_broker_scripts_confirms_then_acks() {
        let broker = MockBroker::new().with_confirms(vec![Confirm::Nack, Confirm::TimedOut]);
        let config = PluginConfig::default();
        let mut conn = broker.connect(&config).await.unwrap();

        let identity = PublishIdentity {
            app_id: "app".to_string(),
            user_id: "user".to_string(),
        };
        conn.publish("all", b"one", &identity).await.unwrap();
        assert_eq!(conn.wait_confirm(Duration::from_secs(1)).await, Confirm::Nack);
        conn.publish("all", b"two", &identity).await.unwrap();
        assert_eq!(
            conn.wait_confirm(Duration::from_secs(1)).await,
            Confirm::TimedOut
        );
        conn.publish("all", b"three", &identity).await.unwrap();
        assert_eq!(conn.wait_confirm(Duration::from_secs(1)).await, Confirm::Ack);

        // Only the acked message counts as delivered.
        assert_eq!(broker.delivered(), vec![("all".to_string(), b"three".to_vec())]);
        assert_eq!(broker.publish_attempts(), 3);
    }

    #[tokio::test]
    async fn test_mock_broker_connect_failures_run_out() {
        let broker = MockBroker::new().with_connect_failures(2);
        let config = PluginConfig::default();
        assert!(broker.connect(&config).await.is_err());
        assert!(broker.connect(&config).await.is_err());
        assert!(broker.connect(&config).await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }
}
