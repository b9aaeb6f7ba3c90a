//! Synthetic workload for exercising a configured scheduler.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use lanes_core::{AllocationMap, LanesConfig, Priority};
use lanes_scheduler::predicates::has_id;
use lanes_scheduler::{SchedulerMetrics, TaskBuilder, TaskOutcome, TasksManager};

const STEP: Duration = Duration::from_millis(5);

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub canceled: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub tasks: usize,
    pub elapsed_ms: u128,
    pub outcomes: OutcomeCounts,
    pub metrics: SchedulerMetrics,
}

/// Priority of the i-th synthetic task: cycles through the lane thresholds
/// so every lane sees traffic.
pub fn priority_for(map: &AllocationMap, i: usize) -> Priority {
    let thresholds: Vec<_> = map.keys().copied().collect();
    if thresholds.is_empty() {
        return 0;
    }
    thresholds[i % thresholds.len()]
}

pub fn run(config: &LanesConfig, tasks: usize, duration: Duration, cancel_every: usize) -> Result<SimulationReport> {
    let manager = TasksManager::new(config).context("failed to start tasks manager")?;
    let map = config.allocation_map();
    let started = Instant::now();
    info!(tasks, ?duration, cancel_every, "Starting simulation");

    let mut handles = Vec::with_capacity(tasks);
    for i in 0..tasks {
        let handle = manager.schedule(
            TaskBuilder::new(priority_for(&map, i), move |ctx| {
                let deadline = Instant::now() + duration;
                while Instant::now() < deadline {
                    ctx.check_canceled()?;
                    std::thread::sleep(STEP.min(duration));
                }
                Ok(i)
            })
            .cancelable(),
        );
        if cancel_every > 0 && (i + 1) % cancel_every == 0 {
            manager.scheduler().cancel(has_id(handle.id()));
        }
        handles.push(handle);
    }

    let mut outcomes = OutcomeCounts::default();
    for handle in handles {
        match handle.blocking_outcome() {
            TaskOutcome::Success(_) => outcomes.succeeded += 1,
            TaskOutcome::Canceled => outcomes.canceled += 1,
            TaskOutcome::Failed(_) => outcomes.failed += 1,
        }
    }

    let metrics = manager.scheduler().metrics();
    manager.shutdown().context("scheduler did not shut down cleanly")?;

    Ok(SimulationReport { tasks, elapsed_ms: started.elapsed().as_millis(), outcomes, metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanes_core::LaneConfig;

    fn config() -> LanesConfig {
        LanesConfig {
            lanes: vec![
                LaneConfig { threshold: 10, slots: 1 },
                LaneConfig { threshold: 20, slots: 2 },
            ],
            worker_threads: 0,
            ping_interval_ms: 20,
            shutdown_timeout_ms: 2000,
        }
    }

    #[test]
    fn priorities_cycle_through_lanes() {
        let map = config().allocation_map();
        let seen: Vec<_> = (0..4).map(|i| priority_for(&map, i)).collect();
        assert_eq!(seen, vec![10, 20, 10, 20]);
        assert_eq!(priority_for(&AllocationMap::new(), 3), 0);
    }

    #[test]
    fn every_task_gets_an_outcome() {
        let report = run(&config(), 12, Duration::from_millis(10), 3).unwrap();
        let counts = &report.outcomes;
        assert_eq!(counts.succeeded + counts.canceled + counts.failed, 12);
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.canceled, 4);
        assert_eq!(report.metrics.scheduled, 12);
    }
}
