//! Performance metrics for the telemetry pipeline
//!
//! Tracks dispatch latency, message throughput, connection success rate,
//! and queue evictions. All rolling windows are bounded so the aggregator
//! has constant memory regardless of uptime.
//!
//! The time-sensitive operations take an explicit `Instant` (`*_at`
//! variants) so tests can drive a synthetic clock; the plain variants use
//! `Instant::now()`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Size of the rolling window for latency samples
const LATENCY_WINDOW_SIZE: usize = 100;

/// Arrivals older than this are evicted from the throughput window
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

/// Rolling performance counters for the pipeline
#[derive(Debug, Clone)]
pub struct PerfMetrics {
    /// Total messages dispatched to the router
    pub messages_received: u64,
    /// Total messages handed to the transport for publishing
    pub messages_sent: u64,
    /// Total queue slots reclaimed by drop-oldest eviction
    pub evictions: u64,
    /// Connection attempts recorded
    pub connection_attempts: u64,
    /// Successful connection attempts
    pub successful_connections: u64,

    /// Rolling window of recent dispatch latencies in milliseconds
    latencies_ms: VecDeque<f64>,
    /// Arrival timestamps within the last minute
    arrivals: VecDeque<Instant>,
}

impl Default for PerfMetrics {
    fn default() -> Self {
        Self {
            messages_received: 0,
            messages_sent: 0,
            evictions: 0,
            connection_attempts: 0,
            successful_connections: 0,
            latencies_ms: VecDeque::with_capacity(LATENCY_WINDOW_SIZE),
            arrivals: VecDeque::new(),
        }
    }
}

impl PerfMetrics {
    /// Create a fresh aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the queue-to-dispatch latency of one message
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.latencies_ms.push_back(latency_ms);
        if self.latencies_ms.len() > LATENCY_WINDOW_SIZE {
            self.latencies_ms.pop_front();
        }
    }

    /// Arithmetic mean over the rolling latency window
    pub fn average_latency_ms(&self) -> f64 {
        if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
        }
    }

    /// Record one message arrival at `now`
    pub fn record_arrival_at(&mut self, now: Instant) {
        self.messages_received += 1;
        self.arrivals.push_back(now);
    }

    /// Record one message arrival
    pub fn record_arrival(&mut self) {
        self.record_arrival_at(Instant::now());
    }

    /// Record a message handed to the transport
    pub fn record_sent(&mut self) {
        self.messages_sent += 1;
    }

    /// Messages that arrived within the last minute before `now`
    ///
    /// Evicts entries older than the window, so repeated calls are cheap.
    pub fn throughput_per_minute_at(&mut self, now: Instant) -> usize {
        while let Some(front) = self.arrivals.front() {
            if now.duration_since(*front) > THROUGHPUT_WINDOW {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
        self.arrivals.len()
    }

    /// Messages that arrived within the last minute
    pub fn throughput_per_minute(&mut self) -> usize {
        self.throughput_per_minute_at(Instant::now())
    }

    /// Record a connection attempt outcome
    pub fn record_connection_attempt(&mut self, success: bool) {
        self.connection_attempts += 1;
        if success {
            self.successful_connections += 1;
        }
    }

    /// Fraction of connection attempts that succeeded (0 with no attempts)
    pub fn success_rate(&self) -> f64 {
        if self.connection_attempts == 0 {
            0.0
        } else {
            self.successful_connections as f64 / self.connection_attempts as f64
        }
    }

    /// Fold in queue evictions observed since the last bookkeeping run
    pub fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }

    /// Point-in-time summary for dashboards/logging
    pub fn snapshot_at(&mut self, now: Instant) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
            evictions: self.evictions,
            average_latency_ms: self.average_latency_ms(),
            throughput_per_minute: self.throughput_per_minute_at(now),
            connection_success_rate: self.success_rate(),
        }
    }

    /// Reset all counters and windows
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Immutable summary of the aggregator
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub evictions: u64,
    pub average_latency_ms: f64,
    pub throughput_per_minute: usize,
    pub connection_success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_window_bounded() {
        let mut metrics = PerfMetrics::new();
        for i in 0..250 {
            metrics.record_latency(i as f64);
        }
        // only the most recent 100 samples remain: 150..=249
        let expected = (150..250).sum::<i32>() as f64 / 100.0;
        assert!((metrics.average_latency_ms() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_average_latency_empty() {
        let metrics = PerfMetrics::new();
        assert_eq!(metrics.average_latency_ms(), 0.0);
    }

    #[test]
    fn test_throughput_evicts_old_arrivals() {
        let mut metrics = PerfMetrics::new();
        let start = Instant::now();
        for i in 0..10 {
            metrics.record_arrival_at(start + Duration::from_secs(i));
        }
        // 70 seconds in, arrivals at t=0..=9 are all older than a minute
        // except t=10s onward; t=9 is 61s old and evicted too
        assert_eq!(
            metrics.throughput_per_minute_at(start + Duration::from_secs(70)),
            0
        );

        metrics.record_arrival_at(start + Duration::from_secs(65));
        assert_eq!(
            metrics.throughput_per_minute_at(start + Duration::from_secs(70)),
            1
        );
        // totals are unaffected by window eviction
        assert_eq!(metrics.messages_received, 11);
    }

    #[test]
    fn test_success_rate() {
        let mut metrics = PerfMetrics::new();
        assert_eq!(metrics.success_rate(), 0.0);

        metrics.record_connection_attempt(true);
        metrics.record_connection_attempt(false);
        metrics.record_connection_attempt(true);
        metrics.record_connection_attempt(true);
        assert!((metrics.success_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot() {
        let mut metrics = PerfMetrics::new();
        let now = Instant::now();
        metrics.record_arrival_at(now);
        metrics.record_latency(2.0);
        metrics.record_latency(4.0);
        metrics.record_evictions(3);

        let snap = metrics.snapshot_at(now);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.throughput_per_minute, 1);
        assert_eq!(snap.evictions, 3);
        assert!((snap.average_latency_ms - 3.0).abs() < 1e-9);
    }
}
