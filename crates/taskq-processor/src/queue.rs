use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use taskq_core::{Priority, Result, Task, TaskError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::debug;

/// A task wrapper for priority queue ordering
struct QueuedTask {
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the lowest priority value must compare greatest
        match other.task.priority.cmp(&self.task.priority) {
            // Within same priority, earlier insertion first (FIFO)
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

/// In-memory priority queue for pending and retrying tasks
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a task into the queue and wake one idle consumer
    pub fn enqueue(&self, task: Task) {
        {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            debug!(task_id = %task.id, priority = %task.priority, seq, "Enqueued task");
            inner.heap.push(QueuedTask { seq, task });
        }
        self.notify.notify_waiters();
    }

    /// Pop the highest priority task; `EmptyQueue` if there is none
    pub fn dequeue(&self) -> Result<Task> {
        self.try_dequeue().ok_or(TaskError::EmptyQueue)
    }

    pub fn try_dequeue(&self) -> Option<Task> {
        self.inner.lock().heap.pop().map(|queued| queued.task)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Get queue depth per priority tier, in dequeue order
    pub fn depth_by_priority(&self) -> [(Priority, usize); 3] {
        let inner = self.inner.lock();
        Priority::ALL.map(|tier| {
            let depth = inner
                .heap
                .iter()
                .filter(|queued| queued.task.priority == tier)
                .count();
            (tier, depth)
        })
    }

    /// Future resolved by the next `enqueue` or `wake_all`.
    /// Enable it before re-checking the queue so no wake-up is lost.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Wake every waiting consumer so it can re-check its exit condition
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}
