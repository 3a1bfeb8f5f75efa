//! Transport worker thread
//!
//! The worker owns the [`BrokerTransport`] and runs the connection state
//! machine: it processes commands from the handle, polls the transport,
//! pushes inbound messages onto the shared queue, and schedules reconnect
//! attempts with exponential backoff. It is the only thread that touches
//! the transport, which keeps the transport implementations lock-free.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::link::codec::PayloadCodec;
use crate::link::queue::{LinkMessage, MessageQueue};
use crate::link::transport::{BrokerTransport, TransportEvent};
use crate::link::{ConnectionState, LinkCommand, LinkEvent};
use crate::types::QosLevel;

const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Delay before reconnect attempt number `failures + 1`
///
/// Doubles from one second per consecutive failure, capped at thirty
/// seconds: 1000, 2000, 4000, 8000, 16000, 30000, 30000, ...
pub fn backoff_delay(failures: u32) -> Duration {
    const BASE_MS: u64 = 1_000;
    const CAP_MS: u64 = 30_000;
    let delay = BASE_MS.saturating_mul(1u64 << failures.min(15));
    Duration::from_millis(delay.min(CAP_MS))
}

pub(super) struct LinkWorker {
    command_rx: Receiver<LinkCommand>,
    event_tx: Sender<LinkEvent>,
    inbound: Arc<MessageQueue>,
    outbound: Arc<MessageQueue>,
    transport: Box<dyn BrokerTransport>,
    codec: Box<dyn PayloadCodec>,
    state: ConnectionState,
    shared_state: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
    max_reconnect_attempts: u32,
    connect_timeout: Duration,
    /// Consecutive failed connect attempts since the last success
    failures: u32,
    /// Deadline for the in-flight connect attempt
    connect_deadline: Option<Instant>,
    /// When the next backoff retry fires
    next_retry_at: Option<Instant>,
    /// Patterns to (re)subscribe on every successful connect
    subscriptions: Vec<(String, QosLevel)>,
}

impl LinkWorker {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        command_rx: Receiver<LinkCommand>,
        event_tx: Sender<LinkEvent>,
        inbound: Arc<MessageQueue>,
        outbound: Arc<MessageQueue>,
        transport: Box<dyn BrokerTransport>,
        codec: Box<dyn PayloadCodec>,
        shared_state: Arc<AtomicU8>,
        running: Arc<AtomicBool>,
        max_reconnect_attempts: u32,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            command_rx,
            event_tx,
            inbound,
            outbound,
            transport,
            codec,
            state: ConnectionState::Disconnected,
            shared_state,
            running,
            max_reconnect_attempts,
            connect_timeout,
            failures: 0,
            connect_deadline: None,
            next_retry_at: None,
            subscriptions: Vec::new(),
        }
    }

    pub(super) fn run(mut self) {
        tracing::debug!("link worker started");
        while self.running.load(Ordering::Relaxed) {
            self.process_commands();
            self.advance_timers(Instant::now());
            if let Some(event) = self.transport.poll(POLL_TIMEOUT) {
                self.handle_transport_event(event);
            } else if !self.session_active() {
                // no open session to poll; avoid spinning on try_recv
                std::thread::sleep(self.idle_sleep(Instant::now()));
            }
        }
        self.transport.close();
        tracing::debug!("link worker stopped");
    }

    /// Whether the transport currently has a session worth polling
    fn session_active(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) || (self.state == ConnectionState::Reconnecting && self.connect_deadline.is_some())
    }

    fn idle_sleep(&self, now: Instant) -> Duration {
        match self.next_retry_at {
            Some(at) => at.saturating_duration_since(now).min(POLL_TIMEOUT),
            None => POLL_TIMEOUT,
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::info!(from = ?self.state, to = ?state, "connection state changed");
        self.state = state;
        self.shared_state.store(state.as_u8(), Ordering::SeqCst);
        let _ = self.event_tx.send(LinkEvent::StateChanged(state));
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                LinkCommand::Connect => self.handle_connect(),
                LinkCommand::Disconnect => self.handle_disconnect(),
                LinkCommand::Subscribe { pattern, qos } => self.handle_subscribe(pattern, qos),
                LinkCommand::Publish(message) => {
                    if let Err(err) = self.send_to_transport(&message) {
                        tracing::warn!(topic = %message.topic, %err, "publish failed; queueing");
                        self.outbound.push(message);
                    } else {
                        let _ = self.event_tx.send(LinkEvent::MessageSent);
                    }
                }
                LinkCommand::FlushOutbound { max } => self.flush_outbound(max),
                LinkCommand::Shutdown => {
                    self.running.store(false, Ordering::Relaxed);
                }
            }
        }
    }

    fn handle_connect(&mut self) {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::PermanentlyFailed => {
                self.failures = 0;
                self.next_retry_at = None;
                self.begin_attempt(ConnectionState::Connecting);
            }
            _ => tracing::debug!(state = ?self.state, "connect ignored"),
        }
    }

    fn handle_disconnect(&mut self) {
        // cancels any pending retry; the outbound queue keeps its contents
        self.transport.close();
        self.connect_deadline = None;
        self.next_retry_at = None;
        self.failures = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_subscribe(&mut self, pattern: String, qos: QosLevel) {
        if !self.subscriptions.iter().any(|(p, _)| *p == pattern) {
            self.subscriptions.push((pattern.clone(), qos));
        }
        if self.state == ConnectionState::Connected {
            if let Err(err) = self.transport.subscribe(&pattern, qos) {
                tracing::warn!(%pattern, %err, "broker subscribe failed");
            }
        }
    }

    fn begin_attempt(&mut self, state: ConnectionState) {
        self.next_retry_at = None;
        self.set_state(state);
        match self.transport.open() {
            Ok(()) => {
                self.connect_deadline = Some(Instant::now() + self.connect_timeout);
            }
            Err(err) => {
                tracing::warn!(%err, "transport open failed");
                self.attempt_failed();
            }
        }
    }

    fn attempt_failed(&mut self) {
        self.transport.close();
        self.connect_deadline = None;
        self.failures += 1;
        let _ = self.event_tx.send(LinkEvent::ConnectAttempt { success: false });
        if self.failures >= self.max_reconnect_attempts {
            tracing::error!(
                failures = self.failures,
                "giving up after repeated connect failures"
            );
            self.next_retry_at = None;
            self.set_state(ConnectionState::PermanentlyFailed);
        } else {
            let delay = backoff_delay(self.failures - 1);
            tracing::info!(failures = self.failures, ?delay, "retrying after backoff");
            self.next_retry_at = Some(Instant::now() + delay);
            self.set_state(ConnectionState::Reconnecting);
        }
    }

    fn advance_timers(&mut self, now: Instant) {
        if let Some(deadline) = self.connect_deadline {
            if now >= deadline {
                tracing::warn!("connect attempt timed out");
                self.attempt_failed();
                return;
            }
        }
        if let Some(retry_at) = self.next_retry_at {
            if now >= retry_at {
                self.begin_attempt(ConnectionState::Reconnecting);
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.connect_deadline = None;
                self.next_retry_at = None;
                self.failures = 0;
                let _ = self.event_tx.send(LinkEvent::ConnectAttempt { success: true });
                self.set_state(ConnectionState::Connected);
                self.resubscribe();
            }
            TransportEvent::ConnectionLost(reason) => match self.state {
                ConnectionState::Connected => {
                    tracing::warn!(%reason, "connection lost");
                    self.transport.close();
                    self.connect_deadline = None;
                    self.next_retry_at = Some(Instant::now() + backoff_delay(self.failures));
                    self.set_state(ConnectionState::Reconnecting);
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    tracing::warn!(%reason, "connect attempt failed");
                    self.attempt_failed();
                }
                _ => {}
            },
            TransportEvent::Message {
                topic,
                payload,
                qos,
                retain,
            } => match self.codec.decode(&payload) {
                Ok(decoded) => {
                    self.inbound.push(
                        LinkMessage::new(topic, decoded)
                            .with_qos(qos)
                            .with_retain(retain),
                    );
                }
                Err(err) => {
                    tracing::warn!(%topic, %err, "dropping undecodable payload");
                }
            },
        }
    }

    fn resubscribe(&mut self) {
        for (pattern, qos) in self.subscriptions.clone() {
            if let Err(err) = self.transport.subscribe(&pattern, qos) {
                tracing::warn!(%pattern, %err, "resubscribe failed");
            } else {
                tracing::debug!(%pattern, "resubscribed");
            }
        }
    }

    fn send_to_transport(&mut self, message: &LinkMessage) -> crate::error::Result<()> {
        let encoded = self.codec.encode(&message.payload)?;
        self.transport
            .publish(&message.topic, &encoded, message.qos, message.retain)
    }

    fn flush_outbound(&mut self, max: usize) {
        if self.state != ConnectionState::Connected {
            return;
        }
        for message in self.outbound.drain(max) {
            if let Err(err) = self.send_to_transport(&message) {
                tracing::warn!(topic = %message.topic, %err, "flush publish failed; requeueing");
                self.outbound.push(message);
                break;
            }
            let _ = self.event_tx.send(LinkEvent::MessageSent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::codec::PassthroughCodec;
    use crate::link::mock::{MockHandle, MockTransport};
    use crossbeam_channel::unbounded;

    struct Harness {
        worker: LinkWorker,
        handle: MockHandle,
        command_tx: Sender<LinkCommand>,
        event_rx: Receiver<LinkEvent>,
    }

    fn harness() -> Harness {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (transport, handle) = MockTransport::create();
        let worker = LinkWorker::new(
            command_rx,
            event_tx,
            Arc::new(MessageQueue::new(100)),
            Arc::new(MessageQueue::new(100)),
            Box::new(transport),
            Box::new(PassthroughCodec),
            Arc::new(AtomicU8::new(ConnectionState::Disconnected.as_u8())),
            Arc::new(AtomicBool::new(true)),
            5,
            Duration::from_secs(30),
        );
        Harness {
            worker,
            handle,
            command_tx,
            event_rx,
        }
    }

    /// Run one worker iteration by hand (commands, timers, one poll)
    fn step(worker: &mut LinkWorker) {
        worker.process_commands();
        worker.advance_timers(Instant::now());
        if let Some(event) = worker.transport.poll(Duration::from_millis(1)) {
            worker.handle_transport_event(event);
        }
    }

    #[test]
    fn test_backoff_delay_sequence() {
        let expected = [1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000];
        for (failures, ms) in expected.iter().enumerate() {
            assert_eq!(
                backoff_delay(failures as u32),
                Duration::from_millis(*ms),
                "failures = {failures}"
            );
        }
        // cap holds for absurd counts too
        assert_eq!(backoff_delay(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_connect_success_resets_failures() {
        let mut h = harness();
        h.handle.script_connect(false);
        h.command_tx.send(LinkCommand::Connect).unwrap();
        step(&mut h.worker);
        step(&mut h.worker);
        assert_eq!(h.worker.state, ConnectionState::Reconnecting);
        assert_eq!(h.worker.failures, 1);

        // force the retry timer and let the (unscripted, succeeding) attempt run
        h.worker.next_retry_at = Some(Instant::now());
        step(&mut h.worker);
        step(&mut h.worker);
        assert_eq!(h.worker.state, ConnectionState::Connected);
        assert_eq!(h.worker.failures, 0);

        let successes: Vec<bool> = h
            .event_rx
            .try_iter()
            .filter_map(|e| match e {
                LinkEvent::ConnectAttempt { success } => Some(success),
                _ => None,
            })
            .collect();
        assert_eq!(successes, vec![false, true]);
    }

    #[test]
    fn test_permanent_failure_after_max_attempts() {
        let mut h = harness();
        for _ in 0..5 {
            h.handle.script_connect(false);
        }
        h.command_tx.send(LinkCommand::Connect).unwrap();
        for _ in 0..5 {
            step(&mut h.worker);
            step(&mut h.worker);
            h.worker.next_retry_at = h.worker.next_retry_at.map(|_| Instant::now());
        }
        assert_eq!(h.worker.state, ConnectionState::PermanentlyFailed);
        assert_eq!(h.worker.failures, 5);
        // no retry pending once permanently failed
        assert!(h.worker.next_retry_at.is_none());

        // an explicit connect starts over from a clean slate
        h.command_tx.send(LinkCommand::Connect).unwrap();
        step(&mut h.worker);
        step(&mut h.worker);
        assert_eq!(h.worker.state, ConnectionState::Connected);
    }

    #[test]
    fn test_resubscribes_after_reconnect() {
        let mut h = harness();
        h.command_tx.send(LinkCommand::Connect).unwrap();
        h.command_tx
            .send(LinkCommand::Subscribe {
                pattern: "station/sensors/+/data".into(),
                qos: QosLevel::AtLeastOnce,
            })
            .unwrap();
        step(&mut h.worker);
        step(&mut h.worker);
        assert_eq!(h.worker.state, ConnectionState::Connected);
        assert_eq!(h.handle.subscribed(), vec!["station/sensors/+/data"]);

        h.handle.drop_connection("broker restart");
        step(&mut h.worker);
        assert_eq!(h.worker.state, ConnectionState::Reconnecting);

        h.worker.next_retry_at = Some(Instant::now());
        step(&mut h.worker);
        step(&mut h.worker);
        assert_eq!(h.worker.state, ConnectionState::Connected);
        assert_eq!(
            h.handle.subscribed(),
            vec!["station/sensors/+/data", "station/sensors/+/data"]
        );
    }

    #[test]
    fn test_disconnect_cancels_retry_and_keeps_outbound() {
        let mut h = harness();
        h.worker
            .outbound
            .push(LinkMessage::new("station/cmd", b"hold".to_vec()));
        h.handle.script_connect(false);
        h.command_tx.send(LinkCommand::Connect).unwrap();
        step(&mut h.worker);
        step(&mut h.worker);
        assert!(h.worker.next_retry_at.is_some());

        h.command_tx.send(LinkCommand::Disconnect).unwrap();
        step(&mut h.worker);
        assert_eq!(h.worker.state, ConnectionState::Disconnected);
        assert!(h.worker.next_retry_at.is_none());
        assert_eq!(h.worker.outbound.len(), 1);
    }

    #[test]
    fn test_inbound_message_lands_on_queue() {
        let mut h = harness();
        h.command_tx.send(LinkCommand::Connect).unwrap();
        step(&mut h.worker);
        step(&mut h.worker);

        h.handle.inject_message("station/sensors/042/data", b"{}".to_vec());
        step(&mut h.worker);
        let message = h.worker.inbound.pop().unwrap();
        assert_eq!(message.topic, "station/sensors/042/data");
        assert_eq!(message.payload, b"{}");
    }

    #[test]
    fn test_flush_only_while_connected() {
        let mut h = harness();
        h.worker
            .outbound
            .push(LinkMessage::new("station/cmd", b"go".to_vec()));

        h.command_tx
            .send(LinkCommand::FlushOutbound { max: 10 })
            .unwrap();
        step(&mut h.worker);
        assert_eq!(h.worker.outbound.len(), 1);
        assert!(h.handle.published().is_empty());

        h.command_tx.send(LinkCommand::Connect).unwrap();
        step(&mut h.worker);
        step(&mut h.worker);
        h.command_tx
            .send(LinkCommand::FlushOutbound { max: 10 })
            .unwrap();
        step(&mut h.worker);
        assert!(h.worker.outbound.is_empty());
        assert_eq!(h.handle.published().len(), 1);
        assert_eq!(h.handle.published()[0].topic, "station/cmd");
    }
}
