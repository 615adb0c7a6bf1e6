//! Plugin facade - public entry point
//!
//! Wires the publish queue, the connection supervisor, and an optional
//! audit sink into one handle. Everything is instance-owned: no global
//! queue, no process-wide supervisor, so multiple independent plugins can
//! coexist in one process and tests stay deterministic.
//!
//! `publish` never performs network I/O. It validates, records to the
//! sink, encodes, and enqueues; delivery is asynchronous and best-effort
//! (at-least-once while the process lives, nothing across restarts).

use crate::config::PluginConfig;
use crate::error::{PluginError, PluginResult};
use crate::protocol::Envelope;
use crate::queue::{PublishQueue, QueueItem};
use crate::sink::{AuditSink, UPLOAD_NAME};
use crate::supervisor::{Supervisor, SupervisorState};
use crate::timeutil;
use crate::transport::{BrokerConnector, MqttConnector};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Routing scope used when the caller passes an empty one.
pub const DEFAULT_SCOPE: &str = "all";

/// Handle to one running telemetry plugin instance.
pub struct Plugin {
    config: PluginConfig,
    queue: Arc<PublishQueue>,
    sink: Option<Arc<dyn AuditSink>>,
    state_rx: watch::Receiver<SupervisorState>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
    subscriptions: Mutex<Vec<String>>,
}

impl Plugin {
    /// Create a plugin over the stock MQTT transport, without an audit
    /// sink. Must be called within a tokio runtime; the supervisor task is
    /// spawned here.
    pub fn create(config: PluginConfig) -> PluginResult<Self> {
        Self::create_with(config, Arc::new(MqttConnector::new()), None)
    }

    /// Create a plugin with an explicit broker connector and optional
    /// audit sink. This is the seam tests use to inject mocks.
    pub fn create_with(
        config: PluginConfig,
        connector: Arc<dyn BrokerConnector>,
        sink: Option<Arc<dyn AuditSink>>,
    ) -> PluginResult<Self> {
        config.validate()?;

        let queue = Arc::new(PublishQueue::new());
        let (state_tx, state_rx) = watch::channel(SupervisorState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor::new(
            config.clone(),
            queue.clone(),
            connector,
            state_tx,
            shutdown_rx,
        );
        let handle = tokio::spawn(supervisor.run());
        info!(app_id = %config.app_id, "plugin created");

        Ok(Self {
            config,
            queue,
            sink,
            state_rx,
            shutdown_tx,
            supervisor: handle,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Publish one telemetry value.
    ///
    /// Returns once the envelope is enqueued; delivery happens in the
    /// background. The only caller-visible failures are argument
    /// validation: an empty `name` or a missing application identity is
    /// unrecoverable misconfiguration ([`PluginError::Programmer`]), not a
    /// transient condition.
    pub async fn publish(
        &self,
        scope: &str,
        name: &str,
        value: i64,
        timestamp: u64,
        meta: Map<String, Value>,
    ) -> PluginResult<()> {
        if name.is_empty() {
            return Err(PluginError::programmer("envelope name must be non-empty"));
        }
        if self.config.app_id.is_empty() {
            return Err(PluginError::programmer(
                "app_id is required to publish; set it in the plugin configuration",
            ));
        }

        let envelope = Envelope::new(name, value, timestamp, meta);

        // Fire-and-forget audit: sink trouble is logged, never propagated,
        // and "upload" records are suppressed unconditionally. Sinks do
        // synchronous I/O, so the write runs on the blocking pool; awaiting
        // it here keeps sink records in publish-call order.
        if let Some(sink) = &self.sink {
            if envelope.name != UPLOAD_NAME {
                let sink = sink.clone();
                let record = envelope.clone();
                match tokio::task::spawn_blocking(move || sink.log(&record)).await {
                    Ok(Err(e)) => {
                        warn!(error = %e, name = %envelope.name, "audit sink write failed")
                    }
                    Err(e) => warn!(error = %e, "audit sink task failed"),
                    Ok(Ok(())) => {}
                }
            }
        }

        let payload = envelope.encode();
        let scope = if scope.is_empty() { DEFAULT_SCOPE } else { scope };
        self.queue.push(QueueItem::new(scope, payload)).await;
        Ok(())
    }

    /// [`publish`](Self::publish) with the current wall-clock nanosecond
    /// timestamp.
    pub async fn publish_now(
        &self,
        scope: &str,
        name: &str,
        value: i64,
        meta: Map<String, Value>,
    ) -> PluginResult<()> {
        self.publish(scope, name, value, timeutil::timestamp_ns(), meta)
            .await
    }

    /// Record interest in consuming `topics`.
    ///
    /// Stub: topic names are validated and recorded, but no consumer loop
    /// is established.
    pub fn subscribe(&self, topics: &[&str]) -> PluginResult<()> {
        if topics.iter().any(|t| t.is_empty()) {
            return Err(PluginError::programmer("topic names must be non-empty"));
        }
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| PluginError::programmer("subscription registry poisoned"))?;
        for topic in topics {
            info!(topic, "subscription recorded (consumer loop not implemented)");
            subscriptions.push((*topic).to_string());
        }
        Ok(())
    }

    /// Topics recorded by [`subscribe`](Self::subscribe).
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Current supervisor state.
    pub fn state(&self) -> SupervisorState {
        self.state_rx.borrow().clone()
    }

    /// Number of envelopes awaiting delivery.
    pub async fn backlog(&self) -> usize {
        self.queue.len().await
    }

    /// Signal shutdown and wait for the supervisor to finish its final
    /// drain and exit. Shutdown latency is bounded by the supervisor's
    /// 1-second poll interval plus any in-flight publish+confirm.
    pub async fn shutdown(self) {
        info!("plugin shutting down");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.supervisor.await {
            error!(error = %e, "supervisor task failed during shutdown");
        }
    }
}
