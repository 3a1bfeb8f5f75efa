//! Multi-cadence task scheduler
//!
//! The pipeline's periodic work runs at different rates: inbound drain at
//! 100 Hz, outbound flush and visual batches at 10 Hz, cosmetic refresh at
//! 2 Hz, metrics at 1 Hz. The scheduler tracks one slot per task and
//! reports which tasks are due on each tick; the caller decides what a
//! task means.
//!
//! A task that falls behind does not replay missed runs: catching up means
//! running once, then resuming the normal cadence from that run.

use std::time::{Duration, Instant};

use crate::config::PipelineConfig;

/// Periodic pipeline tasks, in execution order within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Drain inbound queue and dispatch through the router
    InboundDrain,
    /// Nudge the transport thread to flush buffered publishes
    OutboundFlush,
    /// Apply a bounded batch of dirty sensors to visual consumers
    VisualApply,
    /// Low-rate presentation refresh (labels, summaries)
    CosmeticRefresh,
    /// Fold counters into a metrics snapshot
    Metrics,
}

struct Slot {
    kind: TaskKind,
    interval: Duration,
    last_run: Option<Instant>,
}

pub struct Scheduler {
    slots: Vec<Slot>,
}

impl Scheduler {
    pub fn new(config: &PipelineConfig) -> Self {
        let slot = |kind, ms| Slot {
            kind,
            interval: Duration::from_millis(ms),
            last_run: None,
        };
        Self {
            slots: vec![
                slot(TaskKind::InboundDrain, config.drain_interval_ms),
                slot(TaskKind::OutboundFlush, config.flush_interval_ms),
                slot(TaskKind::VisualApply, config.visual_interval_ms),
                slot(TaskKind::CosmeticRefresh, config.refresh_interval_ms),
                slot(TaskKind::Metrics, config.metrics_interval_ms),
            ],
        }
    }

    /// Tasks due at `now`, marking each as run
    ///
    /// Every task is due on the first call.
    pub fn due(&mut self, now: Instant) -> Vec<TaskKind> {
        let mut due = Vec::new();
        for slot in &mut self.slots {
            let ready = match slot.last_run {
                None => true,
                Some(last) => now.duration_since(last) >= slot.interval,
            };
            if ready {
                slot.last_run = Some(now);
                due.push(slot.kind);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> Scheduler {
        Scheduler::new(&PipelineConfig::default())
    }

    #[test]
    fn test_everything_due_on_first_tick() {
        let mut s = scheduler();
        let due = s.due(Instant::now());
        assert_eq!(
            due,
            vec![
                TaskKind::InboundDrain,
                TaskKind::OutboundFlush,
                TaskKind::VisualApply,
                TaskKind::CosmeticRefresh,
                TaskKind::Metrics,
            ]
        );
    }

    #[test]
    fn test_cadences_diverge() {
        let mut s = scheduler();
        let start = Instant::now();
        s.due(start);

        // 10ms later only the 100 Hz task fires
        let due = s.due(start + Duration::from_millis(10));
        assert_eq!(due, vec![TaskKind::InboundDrain]);

        // 100ms after start the 10 Hz tasks join in
        let due = s.due(start + Duration::from_millis(100));
        assert!(due.contains(&TaskKind::InboundDrain));
        assert!(due.contains(&TaskKind::OutboundFlush));
        assert!(due.contains(&TaskKind::VisualApply));
        assert!(!due.contains(&TaskKind::CosmeticRefresh));
        assert!(!due.contains(&TaskKind::Metrics));

        // a full second in, everything fires
        let due = s.due(start + Duration::from_millis(1100));
        assert_eq!(due.len(), 5);
    }

    #[test]
    fn test_no_replay_after_stall() {
        let mut s = scheduler();
        let start = Instant::now();
        s.due(start);

        // five metric intervals pass with no ticks; one run catches up
        let late = start + Duration::from_secs(5);
        let due = s.due(late);
        assert!(due.contains(&TaskKind::Metrics));
        let due = s.due(late + Duration::from_millis(1));
        assert!(!due.contains(&TaskKind::Metrics));
    }

    #[test]
    fn test_nothing_due_immediately_after_run() {
        let mut s = scheduler();
        let start = Instant::now();
        s.due(start);
        assert!(s.due(start).is_empty());
    }
}
