//! Minimal end-to-end demo: publish one metric and shut down cleanly.
//!
//! Broker settings come from flags or environment variables; the library
//! itself never reads the environment, so the mapping happens here.

use clap::Parser;
use edgetel::observability::init_default_logging;
use edgetel::{FileSink, Plugin, PluginConfig};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "publish-demo", about = "Publish a test metric to the broker")]
struct Args {
    /// Broker username
    #[arg(long, env = "EDGETEL_USERNAME", default_value = "plugin")]
    username: String,

    /// Broker password
    #[arg(long, env = "EDGETEL_PASSWORD", default_value = "plugin")]
    password: String,

    /// Broker hostname
    #[arg(long, env = "EDGETEL_HOST", default_value = "localhost")]
    host: String,

    /// Broker port
    #[arg(long, env = "EDGETEL_PORT", default_value_t = 1883)]
    port: u16,

    /// Application identity stamped onto published messages
    #[arg(long, env = "EDGETEL_APP_ID", default_value = "publish-demo")]
    app_id: String,

    /// Directory for the local audit log (data.ndjson); disabled if unset
    #[arg(long, env = "EDGETEL_LOG_DIR")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_default_logging();
    let args = Args::parse();

    let config = PluginConfig::new(
        args.username,
        args.password,
        args.host,
        args.port,
        args.app_id,
    );

    let sink = match &args.log_dir {
        Some(dir) => Some(Arc::new(FileSink::open(dir)?) as Arc<dyn edgetel::AuditSink>),
        None => None,
    };

    let plugin = Plugin::create_with(
        config,
        Arc::new(edgetel::MqttConnector::new()),
        sink,
    )?;

    let meta = json!({"example": "meta"})
        .as_object()
        .cloned()
        .unwrap_or_default();
    plugin.publish_now("all", "test.metric", 123, meta).await?;
    info!("metric enqueued, draining");

    plugin.shutdown().await;
    Ok(())
}
