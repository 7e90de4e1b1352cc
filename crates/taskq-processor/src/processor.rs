use crate::{
    config::{DispatchMode, ProcessorConfig},
    executor::{ExecutionFailure, TaskExecutor},
    handler::HandlerRegistry,
    queue::TaskQueue,
    retry::{RetryDecision, RetryPolicy},
    stats::StatsCollector,
};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskq_core::{
    Result, RunReport, Task, TaskBuilder, TaskError, TaskFailure, TaskId, TaskRecord, TaskStatus,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Where a processed task goes next
enum Outcome {
    /// Terminal: hand to the stats collector
    Finished(Task),
    /// Back to the queue once `delay` has elapsed
    Retry { task: Task, delay: Duration },
}

/// Number of known tasks per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Drains the queue, dispatching each task to its handler and applying the
/// retry policy to failures.
pub struct TaskProcessor {
    config: Arc<ProcessorConfig>,
    queue: Arc<TaskQueue>,
    registry: Arc<HandlerRegistry>,
    policy: RetryPolicy,
    executor: TaskExecutor,
    stats: Arc<StatsCollector>,
    /// Latest snapshot of every submitted task
    board: Arc<DashMap<TaskId, Task>>,
    outstanding: Arc<AtomicUsize>,
}

impl TaskProcessor {
    pub fn new(config: ProcessorConfig, registry: HandlerRegistry) -> Result<Self> {
        config.validate()?;

        info!(
            "Processor initialised (mode: {:?}, handlers: {:?})",
            config.mode,
            registry.task_types()
        );

        Ok(TaskProcessor {
            policy: config.retry_policy(),
            executor: TaskExecutor::new(config.handler_timeout()),
            config: Arc::new(config),
            queue: Arc::new(TaskQueue::new()),
            registry: Arc::new(registry),
            stats: Arc::new(StatsCollector::new()),
            board: Arc::new(DashMap::new()),
            outstanding: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Task builder preloaded with the configured retry budget
    pub fn task(&self, name: impl Into<String>) -> TaskBuilder {
        Task::builder(name).max_retries(self.config.default_max_retries)
    }

    /// Enqueue a pending task; ids must be unique per processor
    pub fn submit(&self, task: Task) -> Result<TaskId> {
        if task.status != TaskStatus::Pending {
            return Err(TaskError::InvalidTask(format!(
                "task {} is {}, only pending tasks can be submitted",
                task.id, task.status
            )));
        }

        match self.board.entry(task.id.clone()) {
            Entry::Occupied(_) => return Err(TaskError::TaskAlreadyExists(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
            }
        }

        if !self.registry.has_handler(&task.name) {
            warn!("No handler registered for task type {}, task {} will fail", task.name, task.id);
        }

        let task_id = task.id.clone();
        info!(
            "Task submitted: {} (type: {}, priority: {})",
            task_id, task.name, task.priority
        );

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.queue.enqueue(task);
        Ok(task_id)
    }

    /// Drain the queue until every submitted task is terminal
    pub async fn run(&self) -> anyhow::Result<RunReport> {
        let [high, medium, low] = self.queue.depth_by_priority();
        info!(
            "Processing {} queued tasks (high: {}, medium: {}, low: {}) with {} worker(s)",
            self.queue.len(),
            high.1,
            medium.1,
            low.1,
            self.config.effective_workers()
        );

        match self.config.mode {
            DispatchMode::Sequential => self.drain_sequential().await?,
            DispatchMode::Pool => self.drain_pool().await?,
        }

        let report = self.stats.report();
        let summary = &report.summary;
        info!(
            "Run finished: {}/{} completed, {} failed, {} retries in {} ms",
            summary.completed, summary.total, summary.failed, summary.retries, summary.elapsed_ms
        );
        Ok(report)
    }

    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.board.get(task_id).map(|task| task.status)
    }

    /// Current state of a task, with its result or last error
    pub fn get_task(&self, task_id: &str) -> Option<TaskRecord> {
        self.board.get(task_id).map(|task| TaskRecord::from(task.value()))
    }

    /// Known tasks, optionally only those in `status`, in dispatch order
    /// (priority, then submission time)
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = self
            .board
            .iter()
            .filter(|entry| status.map_or(true, |status| entry.value().status == status))
            .map(|entry| TaskRecord::from(entry.value()))
            .collect();
        tasks.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.board.iter() {
            match entry.value().status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Retrying => counts.retrying += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Single consumer. The backoff sleep happens inline, so nothing else
    /// is dequeued while a retried task waits.
    async fn drain_sequential(&self) -> Result<()> {
        while !self.queue.is_empty() {
            let task = self.queue.dequeue()?;
            match self.process(task).await? {
                Outcome::Finished(task) => self.finish(task),
                Outcome::Retry { task, delay } => {
                    tokio::time::sleep(delay).await;
                    self.requeue(task);
                }
            }
        }
        Ok(())
    }

    /// Bounded pool sharing the queue. Backoff runs on a timer task so the
    /// workers keep draining other tasks meanwhile.
    async fn drain_pool(&self) -> anyhow::Result<()> {
        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let processor = self.clone_for_worker();
            workers.spawn(async move { processor.worker_loop(worker_id).await });
        }

        // Dropping the set on an early return aborts the remaining workers
        while let Some(joined) = workers.join_next().await {
            joined??;
        }
        Ok(())
    }

    async fn worker_loop(&self, worker_id: usize) -> Result<()> {
        debug!("Worker {} started", worker_id);

        loop {
            let notified = self.queue.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.queue.try_dequeue() {
                match self.process(task).await? {
                    Outcome::Finished(task) => self.finish(task),
                    Outcome::Retry { task, delay } => self.schedule_retry(task, delay),
                }
                continue;
            }

            // Empty queue is not enough: retries may still be waiting on timers
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }

        debug!("Worker {} stopped", worker_id);
        Ok(())
    }

    /// One pass of the state machine for a dequeued task
    async fn process(&self, mut task: Task) -> Result<Outcome> {
        self.stats.mark_started();

        // Resolution failures are terminal and consume no attempt
        let handler = match self.registry.resolve(&task.name) {
            Ok(handler) => handler,
            Err(e) => {
                error!("✗ Task {} failed: {}", task.id, e);
                let failure = TaskFailure::handler_not_found(&task.name);
                task.fail(failure)?;
                return Ok(Outcome::Finished(task));
            }
        };

        task.begin_attempt()?;
        self.board.insert(task.id.clone(), task.clone());
        info!(
            "Processing task {} (type: {}, attempt {}/{})",
            task.id,
            task.name,
            task.attempts,
            task.max_retries.saturating_add(1)
        );

        let execution = self.executor.execute(&task, handler).await;

        let ExecutionFailure { failure, retryable } = match execution.outcome {
            Ok(value) => {
                task.complete(value)?;
                self.stats.record_execution(execution.elapsed);
                info!(
                    "✓ Task {} completed (time: {:.2?})",
                    task.id, execution.elapsed
                );
                return Ok(Outcome::Finished(task));
            }
            Err(failure) => failure,
        };

        if !retryable {
            error!("✗ Task {} failed permanently: {}", task.id, failure);
            task.fail(failure)?;
            return Ok(Outcome::Finished(task));
        }

        match self.policy.decide(task.attempts, task.max_retries) {
            RetryDecision::Retry { delay } => {
                warn!(
                    "Task {} failed: {} (retry {}/{} in {:?})",
                    task.id, failure, task.attempts, task.max_retries, delay
                );
                task.mark_retrying(failure)?;
                self.board.insert(task.id.clone(), task.clone());
                self.stats.record_retry();
                Ok(Outcome::Retry { task, delay })
            }
            RetryDecision::Exhausted => {
                let failure = TaskFailure::retries_exhausted(&task.id, task.attempts, &failure);
                error!("✗ Task {} failed permanently: {}", task.id, failure);
                task.fail(failure)?;
                Ok(Outcome::Finished(task))
            }
        }
    }

    fn requeue(&self, task: Task) {
        debug!("Re-enqueueing task {} at priority {}", task.id, task.priority);
        self.queue.enqueue(task);
    }

    /// The timer owns the task until its delay elapses
    fn schedule_retry(&self, task: Task, delay: Duration) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Backoff elapsed for task {}", task.id);
            queue.enqueue(task);
        });
    }

    fn finish(&self, task: Task) {
        self.board.insert(task.id.clone(), task.clone());
        self.stats.record_terminal(task);

        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Last task done: release idle pool workers
            self.queue.wake_all();
        }
    }

    /// Clone shared state for a pool worker
    fn clone_for_worker(&self) -> Self {
        TaskProcessor {
            config: self.config.clone(),
            queue: self.queue.clone(),
            registry: self.registry.clone(),
            policy: self.policy.clone(),
            executor: self.executor.clone(),
            stats: self.stats.clone(),
            board: self.board.clone(),
            outstanding: self.outstanding.clone(),
        }
    }
}
