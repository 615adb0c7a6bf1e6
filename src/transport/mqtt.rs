//! MQTT implementation of the broker client capability
//!
//! Maps the abstract connect/publish/confirm/close contract onto rumqttc:
//! connect is gated on a real ConnAck, publishes go out at QoS 1, and the
//! QoS 1 PubAck is the delivery confirmation. The publish identity rides
//! along as MQTT v5 user properties.
//!
//! rumqttc requires its event loop to be polled continuously; keep-alive
//! pings and all socket traffic happen inside `poll`. Each connection
//! therefore spawns a dedicated poller task that runs for the lifetime of
//! the connection and forwards confirmations and connection loss over a
//! channel, so the session stays alive while the publish queue is idle.

use super::{
    BrokerConnection, BrokerConnector, Confirm, ConnectError, PublishError, PublishIdentity,
};
use crate::config::PluginConfig;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::{Packet, PublishProperties};
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop, MqttOptions};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const TOPIC_PREFIX: &str = "telemetry";

/// Telemetry messages are published under `telemetry/{scope}`.
fn topic_for(routing_key: &str) -> String {
    format!("{TOPIC_PREFIX}/{routing_key}")
}

/// What the poller task reports back to the owning connection.
enum ConnectionEvent {
    /// The broker acknowledged the outstanding QoS 1 publish.
    Confirmed,
    /// The event loop errored; the session is gone.
    Lost(String),
}

/// Connects [`MqttConnection`]s for the supervisor.
#[derive(Debug, Default)]
pub struct MqttConnector;

impl MqttConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(
        &self,
        config: &PluginConfig,
    ) -> Result<Box<dyn BrokerConnection>, ConnectError> {
        // Unique client id per attempt: brokers disconnect the older
        // session when an id is reused.
        let client_id = format!("edgetel-{}-{}", config.app_id, Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_credentials(&config.username, &config.password);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, mut event_loop) = AsyncClient::new(options, 16);
        wait_for_connack(&mut event_loop).await?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let poller = tokio::spawn(poll_connection(event_loop, event_tx));

        debug!(host = %config.host, port = config.port, "broker connection established");
        Ok(Box::new(MqttConnection {
            client,
            events,
            poller,
        }))
    }
}

/// Only a ConnAck counts as connected; any earlier event-loop error is a
/// transient connect failure.
async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), ConnectError> {
    let wait = async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(ConnectError::Unreachable(e.to_string())),
            }
        }
    };
    match tokio::time::timeout(CONNECT_TIMEOUT, wait).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Handshake(
            "no ConnAck before timeout".to_string(),
        )),
    }
}

/// Drive the event loop until the connection dies or is discarded.
///
/// The first error ends the task: reconnection belongs to the supervisor,
/// not to rumqttc's own retry.
async fn poll_connection(
    mut event_loop: EventLoop,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                if events.send(ConnectionEvent::Confirmed).is_err() {
                    return;
                }
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = events.send(ConnectionEvent::Lost(e.to_string()));
                return;
            }
        }
    }
}

/// One live QoS 1 publishing session.
///
/// Exclusively owned by the supervisor, which keeps at most one delivery
/// in flight; any `Confirmed` event on the channel therefore belongs to
/// the outstanding publish.
pub struct MqttConnection {
    client: AsyncClient,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    poller: JoinHandle<()>,
}

#[async_trait]
impl BrokerConnection for MqttConnection {
    async fn publish(
        &mut self,
        routing_key: &str,
        payload: &[u8],
        identity: &PublishIdentity,
    ) -> Result<(), PublishError> {
        let props = PublishProperties {
            user_properties: vec![
                ("app_id".to_string(), identity.app_id.clone()),
                ("user_id".to_string(), identity.user_id.clone()),
            ],
            ..Default::default()
        };
        self.client
            .publish_with_properties(
                topic_for(routing_key),
                QoS::AtLeastOnce,
                false,
                payload.to_vec(),
                props,
            )
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    async fn wait_confirm(&mut self, timeout: Duration) -> Confirm {
        match tokio::time::timeout(timeout, self.events.recv()).await {
            Ok(Some(ConnectionEvent::Confirmed)) => Confirm::Ack,
            Ok(Some(ConnectionEvent::Lost(reason))) => {
                warn!(error = %reason, "connection lost while awaiting PubAck");
                Confirm::Nack
            }
            // Poller gone without reporting an error: treat as lost.
            Ok(None) => Confirm::Nack,
            Err(_) => Confirm::TimedOut,
        }
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "broker disconnect failed");
        }
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_for_prefixes_scope() {
        assert_eq!(topic_for("all"), "telemetry/all");
        assert_eq!(topic_for("node"), "telemetry/node");
    }

    // Wires a connection to a hand-held event channel so the confirm
    // logic is testable without a broker. The event loop is kept alive so
    // client requests have somewhere to queue.
    fn test_connection() -> (
        MqttConnection,
        mpsc::UnboundedSender<ConnectionEvent>,
        EventLoop,
    ) {
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, event_loop) = AsyncClient::new(options, 16);
        let (tx, events) = mpsc::unbounded_channel();
        let poller = tokio::spawn(async {});
        (
            MqttConnection {
                client,
                events,
                poller,
            },
            tx,
            event_loop,
        )
    }

    #[tokio::test]
    async fn test_confirmed_event_is_an_ack() {
        let (mut conn, tx, _loop) = test_connection();
        tx.send(ConnectionEvent::Confirmed).unwrap();
        assert_eq!(conn.wait_confirm(Duration::from_secs(1)).await, Confirm::Ack);
    }

    #[tokio::test]
    async fn test_connection_loss_surfaces_as_nack() {
        let (mut conn, tx, _loop) = test_connection();
        tx.send(ConnectionEvent::Lost("broken pipe".to_string()))
            .unwrap();
        assert_eq!(
            conn.wait_confirm(Duration::from_secs(1)).await,
            Confirm::Nack
        );
    }

    #[tokio::test]
    async fn test_dead_poller_surfaces_as_nack() {
        let (mut conn, tx, _loop) = test_connection();
        drop(tx);
        assert_eq!(
            conn.wait_confirm(Duration::from_secs(1)).await,
            Confirm::Nack
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_broker_times_out() {
        let (mut conn, _tx, _loop) = test_connection();
        assert_eq!(
            conn.wait_confirm(Duration::from_secs(1)).await,
            Confirm::TimedOut
        );
    }

    // An ack that arrives while the supervisor is between pop_wait and
    // wait_confirm must not be lost; the channel buffers it.
    #[tokio::test]
    async fn test_early_ack_is_buffered_until_awaited() {
        let (mut conn, tx, _loop) = test_connection();
        tx.send(ConnectionEvent::Confirmed).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(conn.wait_confirm(Duration::from_secs(1)).await, Confirm::Ack);
    }
}
