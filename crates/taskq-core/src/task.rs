use crate::{Priority, Result, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = String;

/// Task payload, handed verbatim to the handler
pub type TaskPayload = serde_json::Map<String, Value>;

/// Retry budget applied when neither the task nor the processor sets one
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue for its first attempt
    Pending,
    /// Owned by the processor, handler running
    Processing,
    /// Failed transiently, waiting out its backoff before re-entering the queue
    Retrying,
    /// Handler succeeded
    Completed,
    /// Failed for good
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `Pending -> Failed` covers tasks whose handler cannot be resolved:
    /// they fail before any attempt starts.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Retrying, Processing)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "retrying" => Ok(TaskStatus::Retrying),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Classification of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    HandlerNotFound,
    HandlerExecution,
    RetriesExhausted,
    Timeout,
}

/// The most recent failure recorded on a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        TaskFailure {
            kind,
            message: message.into(),
        }
    }

    pub fn handler_not_found(name: &str) -> Self {
        Self::new(
            FailureKind::HandlerNotFound,
            TaskError::HandlerNotFound(name.to_string()).to_string(),
        )
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(FailureKind::HandlerExecution, message)
    }

    /// Terminal failure wrapping the last attempt's error
    pub fn retries_exhausted(task_id: &str, attempts: u32, last: &TaskFailure) -> Self {
        let exhausted = TaskError::RetriesExhausted {
            task_id: task_id.to_string(),
            attempts,
        };
        Self::new(
            FailureKind::RetriesExhausted,
            format!("{} (last error: {})", exhausted, last.message),
        )
    }

    /// Failures of these kinds may be retried by the retry policy
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, FailureKind::HandlerExecution | FailureKind::Timeout)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A unit of work plus its execution state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, never reused
    pub id: TaskId,

    /// Task type name (e.g., "send_email", "process_image")
    pub name: String,

    /// Handler input
    pub payload: TaskPayload,

    pub priority: Priority,

    pub status: TaskStatus,

    /// Execution attempts made so far
    pub attempts: u32,

    /// Retries allowed after the first attempt
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,

    /// First attempt start
    pub started_at: Option<DateTime<Utc>>,

    /// Terminal transition time (success or failure)
    pub completed_at: Option<DateTime<Utc>>,

    /// Handler output (if completed)
    pub result: Option<Value>,

    /// Most recent failure
    pub error: Option<TaskFailure>,
}

impl Task {
    /// Create a new pending task with the default retry budget
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        payload: TaskPayload,
        priority: Priority,
    ) -> Result<Self> {
        Task::builder(name)
            .id(id)
            .payload(payload)
            .priority(priority)
            .build()
    }

    /// Create a new task builder
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Start an attempt: `Pending | Retrying -> Processing`.
    /// `started_at` is stamped on the first attempt only.
    pub fn begin_attempt(&mut self) -> Result<()> {
        self.transition(TaskStatus::Processing)?;
        self.attempts += 1;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark task as completed successfully
    pub fn complete(&mut self, result: Value) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Record a transient failure and park the task until its backoff expires
    pub fn mark_retrying(&mut self, failure: TaskFailure) -> Result<()> {
        self.transition(TaskStatus::Retrying)?;
        self.error = Some(failure);
        Ok(())
    }

    /// Mark task as failed for good
    pub fn fail(&mut self, failure: TaskFailure) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(failure);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Builder for creating tasks with custom configuration
pub struct TaskBuilder {
    id: Option<TaskId>,
    name: String,
    payload: TaskPayload,
    priority: Priority,
    max_retries: u32,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        TaskBuilder {
            id: None,
            name: name.into(),
            payload: TaskPayload::new(),
            priority: Priority::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn payload(mut self, payload: TaskPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Set a single payload entry
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> Result<Task> {
        if self.name.trim().is_empty() {
            return Err(TaskError::InvalidTask("task name must not be empty".into()));
        }

        let id = match self.id {
            Some(id) if id.trim().is_empty() => {
                return Err(TaskError::InvalidTask("task id must not be empty".into()));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        Ok(Task {
            id,
            name: self.name,
            payload: self.payload,
            priority: self.priority,
            status: TaskStatus::Pending,
            attempts: 0,
            max_retries: self.max_retries,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> Task {
        Task::builder("send_email")
            .id("t-1")
            .arg("to", "user@example.com")
            .build()
            .unwrap()
    }

    #[test]
    fn test_task_creation() {
        let task = task();

        assert_eq!(task.id, "t-1");
        assert_eq!(task.name, "send_email");
        assert_eq!(task.payload["to"], json!("user@example.com"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("failed".parse::<TaskStatus>(), Ok(TaskStatus::Failed));
        assert_eq!("Retrying".parse::<TaskStatus>(), Ok(TaskStatus::Retrying));
        for status in [TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Completed] {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_generated_id() {
        let a = Task::builder("cleanup").build().unwrap();
        let b = Task::builder("cleanup").build().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        assert!(matches!(
            Task::builder("  ").build(),
            Err(TaskError::InvalidTask(_))
        ));
        assert!(matches!(
            Task::builder("x").id("").build(),
            Err(TaskError::InvalidTask(_))
        ));
    }

    #[test]
    fn test_success_lifecycle() {
        let mut task = task();

        task.begin_attempt().unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.attempts, 1);
        let started = task.started_at.unwrap();

        task.complete(json!({"status": "sent"})).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.is_terminal());
        assert!(started <= task.completed_at.unwrap());
    }

    #[test]
    fn test_retry_keeps_first_start() {
        let mut task = task();

        task.begin_attempt().unwrap();
        let first_start = task.started_at;
        task.mark_retrying(TaskFailure::execution("smtp down")).unwrap();
        assert_eq!(task.status, TaskStatus::Retrying);
        assert!(task.completed_at.is_none());

        task.begin_attempt().unwrap();
        assert_eq!(task.attempts, 2);
        assert_eq!(task.started_at, first_start);

        task.fail(TaskFailure::execution("smtp down")).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_ref().unwrap().message, "smtp down");
    }

    #[test]
    fn test_unresolvable_task_fails_from_pending() {
        let mut task = task();
        task.fail(TaskFailure::handler_not_found("send_email")).unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.error.unwrap().kind, FailureKind::HandlerNotFound);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut task = task();
        assert!(matches!(
            task.complete(json!(null)),
            Err(TaskError::InvalidTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Completed
            })
        ));

        task.begin_attempt().unwrap();
        task.complete(json!(1)).unwrap();
        assert!(task.begin_attempt().is_err());
        assert!(task.fail(TaskFailure::execution("late")).is_err());
        assert_eq!(task.attempts, 1);
    }

    #[test]
    fn test_failure_classification() {
        let last = TaskFailure::execution("boom");
        let exhausted = TaskFailure::retries_exhausted("t-1", 4, &last);

        assert!(last.is_retryable());
        assert!(TaskFailure::new(FailureKind::Timeout, "slow").is_retryable());
        assert!(!exhausted.is_retryable());
        assert!(!TaskFailure::handler_not_found("x").is_retryable());
        assert!(exhausted.message.contains("boom"));
        assert!(exhausted.message.contains("4 attempts"));
    }

    #[test]
    fn test_task_serialization() {
        let mut task = task();
        task.begin_attempt().unwrap();
        task.complete(json!({"ok": true})).unwrap();

        let encoded = serde_json::to_string(&task).unwrap();
        assert!(encoded.contains("\"status\":\"completed\""));
        let decoded: Task = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.id, task.id);
        assert_eq!(decoded.status, task.status);
        assert_eq!(decoded.attempts, task.attempts);
        assert_eq!(decoded.result, task.result);
    }
}
