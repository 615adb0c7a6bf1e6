//! Connection supervisor
//!
//! Owns the broker connection lifecycle for one plugin instance:
//!
//! ```text
//! Disconnected -> Connecting -> Connected --(delivery failure)--> Disconnected
//!        ^                                                            |
//!        +------------------- fixed 1s backoff ----------------------+
//! ```
//!
//! The terminal `Shutdown` state is reached only after the shutdown signal
//! plus a final drain pass. Network and broker errors are non-fatal here:
//! they are retried indefinitely and never surface to publishing callers.
//!
//! All timing runs on tokio's clock, so tests drive backoff and timeouts
//! with the paused test clock instead of real delays.

use crate::config::PluginConfig;
use crate::queue::{PublishQueue, QueueItem};
use crate::transport::{BrokerConnection, BrokerConnector, Confirm, PublishError, PublishIdentity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Fixed delay between reconnect attempts. No cap, no exponential growth.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Bounded queue wait so the loop can recheck the shutdown flag.
pub const POP_WAIT: Duration = Duration::from_secs(1);
/// Bounded wait for a broker delivery confirmation.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(1);

/// Observable lifecycle state, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Connected,
    Shutdown,
}

enum PumpExit {
    /// Shutdown was signaled; the live connection is handed to the drain.
    Shutdown(Box<dyn BrokerConnection>),
    ConnectionLost,
}

/// Background consumer of the publish queue.
///
/// Exactly one supervisor task exists per plugin instance; it is the only
/// context that performs network I/O, and every blocking step is bounded.
pub struct Supervisor {
    config: PluginConfig,
    identity: PublishIdentity,
    queue: Arc<PublishQueue>,
    connector: Arc<dyn BrokerConnector>,
    state_tx: watch::Sender<SupervisorState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        config: PluginConfig,
        queue: Arc<PublishQueue>,
        connector: Arc<dyn BrokerConnector>,
        state_tx: watch::Sender<SupervisorState>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let identity = config.identity();
        Self {
            config,
            identity,
            queue,
            connector,
            state_tx,
            shutdown_rx,
        }
    }

    /// Run until shutdown. Connect, drain the queue, requeue and reconnect
    /// on failure; on shutdown, one final drain pass, then exit.
    pub async fn run(mut self) {
        info!("publish supervisor started");
        while !self.shutdown_signaled() {
            self.set_state(SupervisorState::Connecting);
            match self.connector.connect(&self.config).await {
                Ok(conn) => {
                    info!(host = %self.config.host, "broker connection up");
                    self.set_state(SupervisorState::Connected);
                    match self.pump(conn).await {
                        PumpExit::Shutdown(conn) => {
                            self.final_drain(Some(conn)).await;
                            self.set_state(SupervisorState::Shutdown);
                            info!("publish supervisor stopped");
                            return;
                        }
                        PumpExit::ConnectionLost => {
                            self.set_state(SupervisorState::Disconnected);
                            self.backoff().await;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "broker connect failed, retrying");
                    self.set_state(SupervisorState::Disconnected);
                    self.backoff().await;
                }
            }
        }

        // Shutdown arrived while disconnected: drain over a fresh
        // connection if one can still be made.
        self.final_drain(None).await;
        self.set_state(SupervisorState::Shutdown);
        info!("publish supervisor stopped");
    }

    /// Deliver queued items until shutdown or a delivery failure.
    async fn pump(&mut self, mut conn: Box<dyn BrokerConnection>) -> PumpExit {
        loop {
            if self.shutdown_signaled() {
                return PumpExit::Shutdown(conn);
            }
            let Some(item) = self.queue.pop_wait(POP_WAIT).await else {
                continue;
            };
            if let Err(e) = deliver(conn.as_mut(), &item, &self.identity).await {
                warn!(
                    error = %e,
                    scope = %item.scope,
                    "delivery failed, requeueing and reconnecting"
                );
                self.queue.push(item).await;
                conn.close().await;
                return PumpExit::ConnectionLost;
            }
        }
    }

    /// One best-effort pass over everything still queued at shutdown.
    async fn final_drain(&mut self, conn: Option<Box<dyn BrokerConnection>>) {
        let items = self.queue.drain_all().await;

        let mut conn = match conn {
            Some(conn) => conn,
            None => {
                if items.is_empty() {
                    return;
                }
                match self.connector.connect(&self.config).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(
                            error = %e,
                            dropped = items.len(),
                            "broker unreachable during final drain, dropping queued items"
                        );
                        return;
                    }
                }
            }
        };

        let total = items.len();
        let mut delivered = 0usize;
        let mut iter = items.into_iter();
        for item in iter.by_ref() {
            if let Err(e) = deliver(conn.as_mut(), &item, &self.identity).await {
                error!(
                    error = %e,
                    dropped = 1 + iter.len(),
                    "final drain delivery failed, dropping remaining items"
                );
                break;
            }
            delivered += 1;
        }
        if total > 0 {
            info!(delivered, total, "final drain finished");
        }

        let leftover = self.queue.len().await;
        if leftover > 0 {
            warn!(leftover, "items enqueued during shutdown were not delivered");
        }
        conn.close().await;
    }

    /// Fixed reconnect delay, cut short by shutdown so destroy stays
    /// responsive.
    async fn backoff(&mut self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown_rx.changed() => {}
        }
    }

    fn shutdown_signaled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn set_state(&self, state: SupervisorState) {
        let _ = self.state_tx.send(state);
    }
}

/// Publish one item and wait for the broker's verdict.
async fn deliver(
    conn: &mut dyn BrokerConnection,
    item: &QueueItem,
    identity: &PublishIdentity,
) -> Result<(), PublishError> {
    conn.publish(&item.scope, &item.payload, identity).await?;
    match conn.wait_confirm(CONFIRM_TIMEOUT).await {
        Confirm::Ack => Ok(()),
        Confirm::Nack => Err(PublishError::Nacked),
        Confirm::TimedOut => Err(PublishError::ConfirmTimeout(CONFIRM_TIMEOUT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockBroker;

    fn test_config() -> PluginConfig {
        PluginConfig::new("sensor", "secret", "broker.local", 1883, "test-app")
    }

    struct Harness {
        queue: Arc<PublishQueue>,
        broker: MockBroker,
        state_rx: watch::Receiver<SupervisorState>,
        shutdown_tx: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_supervisor(broker: MockBroker) -> Harness {
        let queue = Arc::new(PublishQueue::new());
        let (state_tx, state_rx) = watch::channel(SupervisorState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor::new(
            test_config(),
            queue.clone(),
            Arc::new(broker.clone()),
            state_tx,
            shutdown_rx,
        );
        let handle = tokio::spawn(supervisor.run());
        Harness {
            queue,
            broker,
            state_rx,
            shutdown_tx,
            handle,
        }
    }

    async fn wait_for_state(rx: &mut watch::Receiver<SupervisorState>, want: SupervisorState) {
        loop {
            if *rx.borrow() == want {
                return;
            }
            rx.changed().await.expect("state channel closed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_connected_state() {
        let mut h = spawn_supervisor(MockBroker::new());
        wait_for_state(&mut h.state_rx, SupervisorState::Connected).await;

        let _ = h.shutdown_tx.send(true);
        h.handle.await.unwrap();
        assert_eq!(*h.state_rx.borrow(), SupervisorState::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_are_retried_with_backoff() {
        let mut h = spawn_supervisor(MockBroker::new().with_connect_failures(3));
        wait_for_state(&mut h.state_rx, SupervisorState::Connected).await;

        // Three failed attempts plus the one that succeeded.
        assert_eq!(h.broker.connect_attempts(), 4);

        let _ = h.shutdown_tx.send(true);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_requeues_and_reconnects() {
        // First confirm nacks, everything after acks.
        let h = spawn_supervisor(MockBroker::new().with_confirms(vec![Confirm::Nack]));
        h.queue.push(QueueItem::new("all", "payload-a")).await;

        // Wait until the item was retried and delivered on the second
        // connection.
        loop {
            if h.broker.delivered().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // Published twice (failed attempt + retry), confirmed once.
        assert_eq!(h.broker.publish_attempts(), 2);
        assert!(h.broker.connect_attempts() >= 2);
        assert!(h.queue.is_empty().await);

        let _ = h.shutdown_tx.send(true);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_disconnected_drains_over_fresh_connection() {
        // Broker down long enough that shutdown arrives before any
        // connection exists, then reachable for the final drain.
        let h = spawn_supervisor(MockBroker::new().with_connect_failures(1000));
        h.queue.push(QueueItem::new("all", "queued-while-down")).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.broker.clear_connect_failures();
        let _ = h.shutdown_tx.send(true);
        h.handle.await.unwrap();

        assert_eq!(h.broker.delivered().len(), 1);
        assert!(h.queue.is_empty().await);
    }
}
