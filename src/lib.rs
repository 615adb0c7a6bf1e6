//! edgetel - reliable telemetry publishing for edge devices
//!
//! A client-side library that emits telemetry to a remote message broker
//! over an unreliable network with at-least-once delivery:
//!
//! - A canonical envelope codec defining the stable wire format
//! - An unbounded thread-safe publish queue decoupling callers from the
//!   network
//! - A background connection supervisor that retries forever, requeues
//!   failed deliveries, and drains the queue on graceful shutdown
//! - A facade wiring it all together, with an optional local audit sink
//!
//! Delivery is at-least-once with relaxed ordering: a failed item is
//! requeued at the tail, so later items may arrive first. The queue is
//! memory-only; anything not flushed is lost with the process.
//!
//! # Quick Start
//!
//! ```no_run
//! use edgetel::{Plugin, PluginConfig};
//! use serde_json::Map;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PluginConfig::new("plugin", "plugin", "localhost", 1883, "weather-station");
//!     let plugin = Plugin::create(config)?;
//!
//!     plugin
//!         .publish_now("all", "env.temperature", 23, Map::new())
//!         .await?;
//!
//!     // Waits for the final drain before returning.
//!     plugin.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod plugin;
pub mod protocol;
pub mod queue;
pub mod sink;
pub mod supervisor;
pub mod testing;
pub mod timeutil;
pub mod transport;
pub mod uploader;

pub use config::{ConfigError, PluginConfig};
pub use error::{PluginError, PluginResult};
pub use plugin::Plugin;
pub use protocol::{Envelope, FormatError, WIRE_FORMAT_VERSION};
pub use queue::{PublishQueue, QueueItem};
pub use sink::{AuditSink, FileSink};
pub use supervisor::SupervisorState;
pub use transport::{BrokerConnection, BrokerConnector, Confirm, MqttConnector};
pub use uploader::Uploader;
