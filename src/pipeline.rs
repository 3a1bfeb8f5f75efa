//! Telemetry pipeline
//!
//! Single-threaded consumer side of the system. [`TelemetryPipeline::tick`]
//! is called from one loop; each tick drains worker events and runs
//! whichever scheduled tasks are due: inbound drain and dispatch, outbound
//! flush nudges, bounded visual batches, the low-rate cosmetic refresh,
//! and metrics bookkeeping.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::cache::{classify, SensorCache};
use crate::config::PipelineConfig;
use crate::link::{BrokerLink, ConnectionState, LinkEvent};
use crate::metrics::{MetricsSnapshot, PerfMetrics};
use crate::routing::{TopicCallback, TopicRouter};
use crate::scheduler::{Scheduler, TaskKind};
use crate::types::{sensor_id_from_topic, QosLevel, SensorRecord, SensorStatus, Severity};

/// Receives batched sensor updates from the pipeline
///
/// Implementations are presentation layers: a dashboard, a 3D scene, a
/// terminal view. All methods are called from the pipeline's tick thread.
pub trait VisualConsumer: Send {
    /// A sensor's state changed; called at most once per sensor per batch
    fn apply_update(&mut self, record: &SensorRecord, severity: Severity);

    /// Turn a sensor's alert highlight on or off
    fn set_highlight(&mut self, sensor_id: &str, active: bool, severity: Option<Severity>);

    /// Low-rate refresh of cosmetic elements from the full cache
    fn refresh(&mut self, cache: &SensorCache);
}

pub struct TelemetryPipeline {
    link: BrokerLink,
    router: TopicRouter,
    cache: Arc<Mutex<SensorCache>>,
    scheduler: Scheduler,
    metrics: PerfMetrics,
    consumers: Vec<Box<dyn VisualConsumer>>,
    /// Sensors currently shown with an alert highlight
    highlighted: HashSet<String>,
    config: PipelineConfig,
    last_snapshot: Option<MetricsSnapshot>,
    seen_inbound_evictions: u64,
    seen_outbound_evictions: u64,
}

impl TelemetryPipeline {
    pub fn new(link: BrokerLink, config: PipelineConfig) -> Self {
        let scheduler = Scheduler::new(&config);
        Self {
            link,
            router: TopicRouter::new(),
            cache: Arc::new(Mutex::new(SensorCache::new())),
            scheduler,
            metrics: PerfMetrics::new(),
            consumers: Vec::new(),
            highlighted: HashSet::new(),
            config,
            last_snapshot: None,
            seen_inbound_evictions: 0,
            seen_outbound_evictions: 0,
        }
    }

    pub fn link(&self) -> &BrokerLink {
        &self.link
    }

    /// Shared cache handle; dashboards may poll it from other threads
    pub fn cache(&self) -> Arc<Mutex<SensorCache>> {
        self.cache.clone()
    }

    pub fn add_consumer(&mut self, consumer: Box<dyn VisualConsumer>) {
        self.consumers.push(consumer);
    }

    /// Subscribe a raw callback to a topic pattern
    ///
    /// Registers the pattern with the broker and routes matching inbound
    /// messages to `callback` on the tick thread.
    pub fn subscribe(
        &mut self,
        pattern: impl Into<String>,
        qos: QosLevel,
        callback: TopicCallback,
    ) -> crate::error::Result<()> {
        let pattern = pattern.into();
        self.link.subscribe(pattern.clone(), qos)?;
        self.router.subscribe(pattern, callback);
        Ok(())
    }

    /// Subscribe a pattern whose payloads are sensor telemetry
    ///
    /// Matching messages are parsed and fed into the sensor cache; the
    /// sensor id comes from the topic, payload fields take precedence.
    pub fn watch_sensor_data(
        &mut self,
        pattern: impl Into<String>,
        qos: QosLevel,
    ) -> crate::error::Result<()> {
        let cache = self.cache.clone();
        self.subscribe(
            pattern,
            qos,
            Box::new(move |topic, payload| {
                let Some(sensor_id) = sensor_id_from_topic(topic) else {
                    tracing::warn!(%topic, "no sensor id in topic; dropping");
                    return;
                };
                match SensorRecord::parse(sensor_id, payload) {
                    Ok(record) => cache.lock().unwrap().upsert(record),
                    Err(err) => {
                        tracing::warn!(%topic, %err, "unparseable sensor payload; dropping")
                    }
                }
            }),
        )
    }

    /// Most recent metrics snapshot, if a metrics task has run
    pub fn last_snapshot(&self) -> Option<&MetricsSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Run one pipeline iteration at `now`
    pub fn tick(&mut self, now: Instant) {
        for event in self.link.events().collect::<Vec<_>>() {
            match event {
                LinkEvent::StateChanged(state) => {
                    tracing::debug!(?state, "link state observed");
                }
                LinkEvent::ConnectAttempt { success } => {
                    self.metrics.record_connection_attempt(success);
                }
                LinkEvent::MessageSent => self.metrics.record_sent(),
            }
        }

        for task in self.scheduler.due(now) {
            match task {
                TaskKind::InboundDrain => self.drain_inbound(),
                TaskKind::OutboundFlush => {
                    if self.link.state() == ConnectionState::Connected {
                        self.link.request_flush(self.config.batch_drain_size);
                    }
                }
                TaskKind::VisualApply => self.apply_visual_batch(),
                TaskKind::CosmeticRefresh => {
                    let cache = self.cache.lock().unwrap();
                    for consumer in &mut self.consumers {
                        consumer.refresh(&cache);
                    }
                }
                TaskKind::Metrics => self.update_metrics(now),
            }
        }
    }

    fn drain_inbound(&mut self) {
        let batch = self.link.inbound().drain(self.config.batch_drain_size);
        for message in batch {
            let latency = message.enqueued_at.elapsed();
            self.metrics.record_latency(latency.as_secs_f64() * 1_000.0);
            self.metrics.record_arrival();
            self.router.dispatch(&message.topic, &message.payload);
        }
    }

    fn apply_visual_batch(&mut self) {
        let batch = self
            .cache
            .lock()
            .unwrap()
            .take_dirty(self.config.batch_update_size);
        for record in &batch {
            let severity = classify(record);
            for consumer in &mut self.consumers {
                consumer.apply_update(record, severity);
            }
            let critical = record.status == SensorStatus::Critical;
            if critical && self.highlighted.insert(record.sensor_id.clone()) {
                for consumer in &mut self.consumers {
                    consumer.set_highlight(&record.sensor_id, true, Some(Severity::Red));
                }
            } else if !critical && self.highlighted.remove(&record.sensor_id) {
                for consumer in &mut self.consumers {
                    consumer.set_highlight(&record.sensor_id, false, None);
                }
            }
        }
    }

    fn update_metrics(&mut self, now: Instant) {
        let inbound = self.link.inbound().evictions();
        let outbound = self.link.outbound().evictions();
        let delta =
            (inbound - self.seen_inbound_evictions) + (outbound - self.seen_outbound_evictions);
        self.seen_inbound_evictions = inbound;
        self.seen_outbound_evictions = outbound;
        self.metrics.record_evictions(delta);

        let snapshot = self.metrics.snapshot_at(now);
        tracing::debug!(
            received = snapshot.messages_received,
            sent = snapshot.messages_sent,
            evictions = snapshot.evictions,
            avg_latency_ms = snapshot.average_latency_ms,
            per_minute = snapshot.throughput_per_minute,
            success_rate = snapshot.connection_success_rate,
            "pipeline metrics"
        );
        self.last_snapshot = Some(snapshot);
    }

    /// Stop the transport thread
    pub fn shutdown(&mut self) {
        self.link.shutdown();
    }
}
