//! Bounded drop-oldest message queues
//!
//! Two of these sit between the transport thread and the pipeline thread:
//! one inbound (broker -> consumers) and one outbound (producers ->
//! broker). Both are bounded; when full, the oldest entry is evicted so
//! the newest data always gets in. Evictions are counted for the metrics
//! aggregator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::types::QosLevel;

/// A message crossing the transport/pipeline boundary
#[derive(Debug, Clone)]
pub struct LinkMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retain: bool,
    /// When the message entered the queue, for pipeline latency tracking
    pub enqueued_at: Instant,
}

impl LinkMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos: QosLevel::default(),
            retain: false,
            enqueued_at: Instant::now(),
        }
    }

    pub fn with_qos(mut self, qos: QosLevel) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Bounded FIFO with drop-oldest overflow
pub struct MessageQueue {
    inner: Mutex<VecDeque<LinkMessage>>,
    capacity: usize,
    evictions: AtomicU64,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evictions: AtomicU64::new(0),
        }
    }

    /// Append a message, evicting the oldest entry if the queue is full
    pub fn push(&self, message: LinkMessage) {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() == self.capacity {
            queue.pop_front();
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(message);
    }

    /// Remove and return the oldest message, if any
    pub fn pop(&self) -> Option<LinkMessage> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Remove up to `max` messages from the front, preserving order
    pub fn drain(&self, max: usize) -> Vec<LinkMessage> {
        let mut queue = self.inner.lock().unwrap();
        let count = max.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages evicted by overflow since creation
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
