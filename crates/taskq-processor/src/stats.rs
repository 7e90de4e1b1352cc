use parking_lot::Mutex;
use std::time::{Duration, Instant};
use taskq_core::{RunReport, RunSummary, Task, TaskStatus};

#[derive(Default)]
struct Inner {
    started: Option<Instant>,
    finished: Option<Instant>,
    completed: usize,
    failed: usize,
    retries: usize,
    executions: u32,
    execution_time: Duration,
    tasks: Vec<Task>,
}

/// Aggregates run statistics and keeps terminal tasks for the report.
///
/// All writes go through one mutex, so pool workers can share it.
#[derive(Default)]
pub struct StatsCollector {
    inner: Mutex<Inner>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the run clock; only the first call counts
    pub fn mark_started(&self) {
        let mut inner = self.inner.lock();
        if inner.started.is_none() {
            inner.started = Some(Instant::now());
        }
    }

    /// Handler wall time of the attempt that completed a task.
    /// Failed attempts are not averaged.
    pub fn record_execution(&self, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.executions += 1;
        inner.execution_time += elapsed;
    }

    pub fn record_retry(&self) {
        self.inner.lock().retries += 1;
    }

    /// Take a task that reached a terminal status.
    /// Non-terminal tasks are ignored.
    pub fn record_terminal(&self, task: Task) {
        let mut inner = self.inner.lock();
        match task.status {
            TaskStatus::Completed => inner.completed += 1,
            TaskStatus::Failed => inner.failed += 1,
            _ => return,
        }
        inner.finished = Some(Instant::now());
        inner.tasks.push(task);
    }

    pub fn summary(&self) -> RunSummary {
        let inner = self.inner.lock();
        let total = inner.completed + inner.failed;
        let success_rate = if total == 0 {
            0.0
        } else {
            inner.completed as f64 / total as f64
        };
        let elapsed = match (inner.started, inner.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        };
        let average_execution_ms = (inner.executions > 0)
            .then(|| inner.execution_time.as_micros() as f64 / 1000.0 / inner.executions as f64);

        RunSummary {
            total,
            completed: inner.completed,
            failed: inner.failed,
            success_rate,
            retries: inner.retries,
            elapsed_ms: elapsed.as_millis() as u64,
            average_execution_ms,
        }
    }

    /// Terminal tasks in the order they finished, with the summary
    pub fn report(&self) -> RunReport {
        let summary = self.summary();
        RunReport::new(&self.inner.lock().tasks, summary)
    }
}
