//! In-memory transport for tests and broker-less demos
//!
//! [`MockTransport`] shares its state with a [`MockHandle`]; tests script
//! connect outcomes, inject inbound messages, and inspect everything the
//! worker published or subscribed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, TwinLinkError};
use crate::link::transport::{BrokerTransport, TransportEvent};
use crate::types::QosLevel;

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retain: bool,
}

#[derive(Default)]
struct MockState {
    /// Scripted outcome per `open()` call; empty means always succeed
    connect_script: VecDeque<bool>,
    pending_events: VecDeque<TransportEvent>,
    published: Vec<PublishedMessage>,
    subscribed: Vec<String>,
    open_calls: usize,
    close_calls: usize,
    session_open: bool,
}

/// Test-side view of a [`MockTransport`]
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Queue an outcome for the next unscripted `open()` call
    pub fn script_connect(&self, success: bool) {
        self.state
            .lock()
            .unwrap()
            .connect_script
            .push_back(success);
    }

    /// Deliver an inbound message on the next poll
    pub fn inject_message(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .pending_events
            .push_back(TransportEvent::Message {
                topic: topic.into(),
                payload: payload.into(),
                qos: QosLevel::AtLeastOnce,
                retain: false,
            });
    }

    /// Deliver a connection-lost event on the next poll
    pub fn drop_connection(&self, reason: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .pending_events
            .push_back(TransportEvent::ConnectionLost(reason.into()));
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().subscribed.clone()
    }

    pub fn open_calls(&self) -> usize {
        self.state.lock().unwrap().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }
}

pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a transport and the handle that controls it
    pub fn create() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                state: handle.state.clone(),
            },
            handle,
        )
    }
}

impl BrokerTransport for MockTransport {
    fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.open_calls += 1;
        state.session_open = true;
        let success = state.connect_script.pop_front().unwrap_or(true);
        let event = if success {
            TransportEvent::Connected
        } else {
            TransportEvent::ConnectionLost("scripted connect failure".into())
        };
        state.pending_events.push_back(event);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        state.session_open = false;
        state.pending_events.clear();
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QosLevel, retain: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.session_open {
            return Err(TwinLinkError::NotConnected);
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    fn subscribe(&mut self, pattern: &str, _qos: QosLevel) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.session_open {
            return Err(TwinLinkError::NotConnected);
        }
        state.subscribed.push(pattern.to_string());
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Option<TransportEvent> {
        let event = self.state.lock().unwrap().pending_events.pop_front();
        if event.is_none() {
            // keep the worker loop from spinning, but stay fast for tests
            std::thread::sleep(timeout.min(Duration::from_millis(1)));
        }
        event
    }
}
