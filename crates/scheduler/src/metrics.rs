use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use lanes_core::Priority;

/// Scheduler counters, exposed as a serializable snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `schedule`.
    pub scheduled: u64,
    /// Tasks handed to the executor (restarted tasks count once per attempt).
    pub dispatched: u64,
    /// Times a popped task was parked in the pending list.
    pub deferred: u64,
    /// Attempts that finished and released their slot.
    pub completed: u64,
    /// Tasks canceled through `cancel`.
    pub canceled: u64,
    /// Tasks restarted through `restart`.
    pub restarted: u64,
    /// Idle re-evaluation pings submitted.
    pub pings: u64,
    /// Attempts finished, by priority.
    pub executions_by_priority: HashMap<Priority, u64>,
    /// Average attempt duration, by priority.
    pub avg_duration_by_priority: HashMap<Priority, Duration>,
    /// When the last attempt finished.
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    /// Record a finished attempt.
    pub fn record_execution(&mut self, priority: Priority, duration: Duration) {
        self.completed += 1;
        self.last_completed_at = Some(Utc::now());

        let count = self.executions_by_priority.entry(priority).or_default();
        *count += 1;
        let count = *count;

        let prev_avg = self
            .avg_duration_by_priority
            .get(&priority)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_duration_by_priority.insert(priority, new_avg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = SchedulerMetrics::default();
        m.record_execution(1000, Duration::from_millis(100));

        assert_eq!(m.completed, 1);
        assert_eq!(m.executions_by_priority[&1000], 1);
        assert!(m.last_completed_at.is_some());
        assert_eq!(m.avg_duration_by_priority[&1000], Duration::from_millis(100));
    }

    #[test]
    fn record_multiple_executions_averages() {
        let mut m = SchedulerMetrics::default();
        m.record_execution(5, Duration::from_millis(100));
        m.record_execution(5, Duration::from_millis(200));
        m.record_execution(7, Duration::from_millis(10));

        assert_eq!(m.completed, 3);
        assert_eq!(m.executions_by_priority[&5], 2);
        let avg = m.avg_duration_by_priority[&5].as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
        assert_eq!(m.avg_duration_by_priority[&7], Duration::from_millis(10));
    }

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::default();
        assert_eq!(m.dispatched, 0);
        assert_eq!(m.pings, 0);
        assert!(m.executions_by_priority.is_empty());
        assert!(m.last_completed_at.is_none());
    }
}
