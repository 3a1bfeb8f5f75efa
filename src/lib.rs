//! # TwinLink: real-time telemetry link for digital twins
//!
//! Connects a water-treatment digital twin to its plant over MQTT:
//! resilient broker connection, wildcard topic routing, a last-value
//! sensor cache, and a multi-cadence pipeline that batches updates to
//! visual consumers.
//!
//! ## Architecture
//!
//! - **Link**: owns the broker transport in a dedicated thread; handles
//!   connect/reconnect with exponential backoff and buffers messages in
//!   bounded drop-oldest queues
//! - **Routing**: MQTT wildcard matching (`+`, `#`) and callback dispatch
//!   with panic isolation
//! - **Cache**: one record per sensor, last received wins, with a dirty
//!   list drained in bounded batches
//! - **Pipeline**: single tick loop running drain, flush, visual, refresh,
//!   and metrics tasks at their own cadences
//! - **Communication**: crossbeam channels between the transport thread
//!   and the tick loop
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Instant;
//! use twinlink::{
//!     config::TwinConfig,
//!     link::BrokerLink,
//!     pipeline::TelemetryPipeline,
//!     types::QosLevel,
//! };
//!
//! fn main() -> twinlink::Result<()> {
//!     let config = TwinConfig::load_or_default();
//!     let link = BrokerLink::new(&config.broker, &config.pipeline);
//!     link.connect();
//!
//!     let mut pipeline = TelemetryPipeline::new(link, config.pipeline);
//!     pipeline.watch_sensor_data("station/sensors/+/data", QosLevel::AtLeastOnce)?;
//!     loop {
//!         pipeline.tick(Instant::now());
//!         std::thread::sleep(std::time::Duration::from_millis(1));
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod link;
pub mod metrics;
pub mod pipeline;
pub mod routing;
pub mod scheduler;
pub mod types;

pub use error::{Result, ResultExt, TwinLinkError};
pub use link::{BrokerLink, ConnectionState, PublishOutcome};
pub use pipeline::{TelemetryPipeline, VisualConsumer};
