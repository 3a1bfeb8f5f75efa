//! Broker transport abstraction
//!
//! The worker drives a [`BrokerTransport`] rather than a concrete MQTT
//! client so the connection state machine, queues, and pipeline can all be
//! exercised against [`MockTransport`](super::mock::MockTransport) without
//! a broker. The production implementation is
//! [`MqttTransport`](super::mqtt::MqttTransport).

use std::time::Duration;

use crate::error::Result;
use crate::types::QosLevel;

/// An event surfaced by polling the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The broker acknowledged the connection
    Connected,
    /// The connection dropped or the connect attempt failed
    ConnectionLost(String),
    /// An application message arrived
    Message {
        topic: String,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    },
}

/// A connection to a message broker
///
/// Implementations are polled from a single worker thread; they do not
/// need interior synchronization. `open` starts a fresh connection
/// attempt; the outcome arrives later as a [`TransportEvent::Connected`]
/// or [`TransportEvent::ConnectionLost`] from `poll`.
pub trait BrokerTransport: Send {
    /// Begin a connection attempt
    fn open(&mut self) -> Result<()>;

    /// Tear down the connection, releasing any session state
    fn close(&mut self);

    /// Send a message to the broker
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QosLevel, retain: bool) -> Result<()>;

    /// Register a subscription pattern with the broker
    fn subscribe(&mut self, pattern: &str, qos: QosLevel) -> Result<()>;

    /// Wait up to `timeout` for the next transport event
    fn poll(&mut self, timeout: Duration) -> Option<TransportEvent>;
}
