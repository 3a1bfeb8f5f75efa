//! Broker link: transport thread, queues, and the public handle
//!
//! [`BrokerLink`] spawns the worker thread that owns the transport and
//! exposes the thread-safe surface the rest of the crate uses: publish
//! (with queue fallback), subscribe, connection state, and the event
//! stream consumed by the pipeline.

mod codec;
mod mock;
mod mqtt;
mod queue;
mod transport;
mod worker;

pub use codec::{PassthroughCodec, PayloadCodec};
pub use mock::{MockHandle, MockTransport, PublishedMessage};
pub use mqtt::MqttTransport;
pub use queue::{LinkMessage, MessageQueue};
pub use transport::{BrokerTransport, TransportEvent};
pub use worker::backoff_delay;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::{BrokerConfig, PipelineConfig};
use crate::error::{Result, TwinLinkError};
use crate::types::QosLevel;
use worker::LinkWorker;

/// Lifecycle of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Lost or failed; retrying with backoff
    Reconnecting,
    /// Gave up after the configured number of consecutive failures
    PermanentlyFailed,
}

impl ConnectionState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::PermanentlyFailed => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::PermanentlyFailed,
            _ => Self::Disconnected,
        }
    }
}

/// Commands sent to the worker thread
pub(crate) enum LinkCommand {
    Connect,
    Disconnect,
    Subscribe { pattern: String, qos: QosLevel },
    Publish(LinkMessage),
    FlushOutbound { max: usize },
    Shutdown,
}

/// Events emitted by the worker thread
#[derive(Debug, Clone)]
pub enum LinkEvent {
    StateChanged(ConnectionState),
    /// A connect attempt finished, successfully or not
    ConnectAttempt { success: bool },
    /// A message was handed to the transport
    MessageSent,
}

/// Result of a [`BrokerLink::publish`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport thread for immediate delivery
    Sent,
    /// Not connected; buffered on the outbound queue
    Queued,
}

/// Handle to the broker connection, safe to use from any thread
pub struct BrokerLink {
    command_tx: Sender<LinkCommand>,
    event_rx: Receiver<LinkEvent>,
    state: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
    inbound: Arc<MessageQueue>,
    outbound: Arc<MessageQueue>,
    thread: Option<JoinHandle<()>>,
}

impl BrokerLink {
    /// Spawn the worker thread over an MQTT transport
    pub fn new(broker: &BrokerConfig, pipeline: &PipelineConfig) -> Self {
        let transport = Box::new(MqttTransport::new(broker.clone()));
        Self::with_transport(transport, Box::new(PassthroughCodec), broker, pipeline)
    }

    /// Spawn the worker thread over an arbitrary transport and codec
    pub fn with_transport(
        transport: Box<dyn BrokerTransport>,
        codec: Box<dyn PayloadCodec>,
        broker: &BrokerConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let state = Arc::new(AtomicU8::new(ConnectionState::Disconnected.as_u8()));
        let running = Arc::new(AtomicBool::new(true));
        let inbound = Arc::new(MessageQueue::new(pipeline.queue_capacity));
        let outbound = Arc::new(MessageQueue::new(pipeline.queue_capacity));

        let worker = LinkWorker::new(
            command_rx,
            event_tx,
            inbound.clone(),
            outbound.clone(),
            transport,
            codec,
            state.clone(),
            running.clone(),
            broker.max_reconnect_attempts,
            Duration::from_secs(broker.connect_timeout_secs),
        );
        let thread = std::thread::Builder::new()
            .name("twinlink-transport".into())
            .spawn(move || worker.run())
            .expect("failed to spawn transport thread");

        Self {
            command_tx,
            event_rx,
            state,
            running,
            inbound,
            outbound,
            thread: Some(thread),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn connect(&self) {
        let _ = self.command_tx.send(LinkCommand::Connect);
    }

    pub fn disconnect(&self) {
        let _ = self.command_tx.send(LinkCommand::Disconnect);
    }

    /// Register a broker subscription pattern
    ///
    /// The pattern is re-registered automatically after every reconnect.
    /// Fails when no connection exists or will exist (disconnected or
    /// permanently failed); while connecting or reconnecting the pattern
    /// is accepted and applied once the session is up.
    pub fn subscribe(&self, pattern: impl Into<String>, qos: QosLevel) -> Result<()> {
        match self.state() {
            ConnectionState::Disconnected | ConnectionState::PermanentlyFailed => {
                Err(TwinLinkError::NotConnected)
            }
            _ => {
                self.command_tx
                    .send(LinkCommand::Subscribe {
                        pattern: pattern.into(),
                        qos,
                    })
                    .map_err(|_| TwinLinkError::Channel("transport thread gone".into()))
            }
        }
    }

    /// Publish a message, buffering it when not connected
    pub fn publish(
        &self,
        topic: impl Into<String>,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> PublishOutcome {
        let message = LinkMessage::new(topic, payload).with_qos(qos).with_retain(retain);
        if self.state() == ConnectionState::Connected {
            match self.command_tx.send(LinkCommand::Publish(message)) {
                Ok(()) => PublishOutcome::Sent,
                Err(err) => {
                    // transport thread is gone; buffer anyway
                    if let LinkCommand::Publish(message) = err.0 {
                        self.outbound.push(message);
                    }
                    PublishOutcome::Queued
                }
            }
        } else {
            self.outbound.push(message);
            PublishOutcome::Queued
        }
    }

    /// Ask the worker to drain up to `max` buffered outbound messages
    pub fn request_flush(&self, max: usize) {
        let _ = self.command_tx.send(LinkCommand::FlushOutbound { max });
    }

    /// Worker events since the last drain
    pub fn events(&self) -> impl Iterator<Item = LinkEvent> + '_ {
        self.event_rx.try_iter()
    }

    pub fn inbound(&self) -> Arc<MessageQueue> {
        self.inbound.clone()
    }

    pub fn outbound(&self) -> Arc<MessageQueue> {
        self.outbound.clone()
    }

    /// Stop the worker thread and wait for it to exit
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(LinkCommand::Shutdown);
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for BrokerLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}
