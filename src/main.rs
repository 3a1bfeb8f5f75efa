//! TwinLink monitor - Main Entry Point
//!
//! Connects to the configured broker, watches sensor telemetry, and logs
//! batched updates. Serves as the reference wiring for embedding the
//! pipeline behind a real dashboard.

use std::time::{Duration, Instant};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use twinlink::{
    cache::SensorCache,
    config::TwinConfig,
    link::BrokerLink,
    pipeline::{TelemetryPipeline, VisualConsumer},
    types::{QosLevel, SensorRecord, Severity},
    ConnectionState,
};

/// Logs sensor updates instead of drawing them
struct LogConsumer;

impl VisualConsumer for LogConsumer {
    fn apply_update(&mut self, record: &SensorRecord, severity: Severity) {
        tracing::info!(
            sensor = %record.sensor_id,
            value = record.value,
            unit = %record.unit,
            status = ?record.status,
            ?severity,
            "sensor update"
        );
    }

    fn set_highlight(&mut self, sensor_id: &str, active: bool, severity: Option<Severity>) {
        tracing::info!(sensor = %sensor_id, active, ?severity, "alert highlight");
    }

    fn refresh(&mut self, cache: &SensorCache) {
        tracing::debug!(sensors = cache.len(), "cosmetic refresh");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,twinlink=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TwinLink monitor");

    let config = TwinConfig::load_or_default();
    tracing::info!(
        broker = %config.broker.host,
        port = config.broker.port,
        "loaded configuration"
    );

    let pattern = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "station/sensors/+/data".to_string());

    let link = BrokerLink::new(&config.broker, &config.pipeline);
    link.connect();
    // subscriptions are rejected before the connect command is picked up
    while link.state() == ConnectionState::Disconnected {
        std::thread::sleep(Duration::from_millis(5));
    }

    let mut pipeline = TelemetryPipeline::new(link, config.pipeline);
    pipeline.add_consumer(Box::new(LogConsumer));
    pipeline.watch_sensor_data(&pattern, QosLevel::AtLeastOnce)?;
    tracing::info!(%pattern, "watching sensor telemetry");

    loop {
        pipeline.tick(Instant::now());
        if pipeline.link().state() == ConnectionState::PermanentlyFailed {
            tracing::error!("broker unreachable; giving up");
            pipeline.shutdown();
            anyhow::bail!("exhausted reconnect attempts against {}", config.broker.host);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
