//! Shared helpers for integration tests

use std::sync::Once;
use std::time::{Duration, Instant};

use twinlink::config::TwinConfig;
use twinlink::link::{BrokerLink, MockHandle, MockTransport, PassthroughCodec, PayloadCodec};
use twinlink::pipeline::TelemetryPipeline;
use twinlink::ConnectionState;

static INIT: Once = Once::new();

/// Initialize test logging once per process
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("twinlink=debug")
            .with_test_writer()
            .try_init();
    });
}

/// A pipeline over a mock transport with default configuration
pub fn mock_pipeline() -> (TelemetryPipeline, MockHandle) {
    mock_pipeline_with(TwinConfig::default(), Box::new(PassthroughCodec))
}

pub fn mock_pipeline_with(
    config: TwinConfig,
    codec: Box<dyn PayloadCodec>,
) -> (TelemetryPipeline, MockHandle) {
    init_tracing();
    let (transport, handle) = MockTransport::create();
    let link =
        BrokerLink::with_transport(Box::new(transport), codec, &config.broker, &config.pipeline);
    (TelemetryPipeline::new(link, config.pipeline), handle)
}

/// Connect the link and block until the worker reports `Connected`
pub fn connect(pipeline: &TelemetryPipeline) {
    pipeline.link().connect();
    wait_for_state(pipeline, ConnectionState::Connected);
}

pub fn wait_for_state(pipeline: &TelemetryPipeline, wanted: ConnectionState) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while pipeline.link().state() != wanted {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {wanted:?}, state is {:?}",
            pipeline.link().state()
        );
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Tick the pipeline until `predicate` holds or the deadline passes
pub fn tick_until(pipeline: &mut TelemetryPipeline, what: &str, predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !predicate() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        pipeline.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// JSON telemetry payload in the shape sensors publish
pub fn sensor_payload(value: f64, unit: &str, status: &str, quality: f64) -> Vec<u8> {
    format!(
        r#"{{"value": {value}, "unit": "{unit}", "status": "{status}", "quality": {quality}}}"#
    )
    .into_bytes()
}
