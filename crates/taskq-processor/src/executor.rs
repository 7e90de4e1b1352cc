use crate::handler::{HandlerError, TaskHandler};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskq_core::{FailureKind, Task, TaskError, TaskFailure};
use tokio::time::timeout;
use tracing::{debug, error};

/// Outcome of a single handler invocation
#[derive(Debug)]
pub struct Execution {
    pub outcome: Result<Value, ExecutionFailure>,
    pub elapsed: Duration,
}

/// Why an invocation did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub failure: TaskFailure,
    /// Whether the retry policy may schedule another attempt
    pub retryable: bool,
}

impl From<HandlerError> for ExecutionFailure {
    fn from(err: HandlerError) -> Self {
        let retryable = err.is_retryable();
        ExecutionFailure {
            retryable,
            failure: TaskFailure::execution(TaskError::from(err).to_string()),
        }
    }
}

/// Runs one handler attempt with an optional timeout and panic recovery
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    timeout: Option<Duration>,
}

impl TaskExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        TaskExecutor { timeout }
    }

    /// Execute `handler` against a copy of the task's payload.
    ///
    /// The handler runs in its own tokio task, so a panic surfaces as a
    /// retryable failure. Without a configured timeout a hung handler
    /// blocks this call indefinitely.
    pub async fn execute(&self, task: &Task, handler: Arc<dyn TaskHandler>) -> Execution {
        let payload = task.payload.clone();
        let started = Instant::now();

        debug!(task_id = %task.id, attempt = task.attempts, "Executing task");

        let mut join = tokio::spawn(async move { handler.execute(payload).await });

        let joined = match self.timeout {
            Some(limit) => match timeout(limit, &mut join).await {
                Ok(joined) => joined,
                Err(_) => {
                    join.abort();
                    error!(task_id = %task.id, "Task timed out after {:?}", limit);
                    let failure = TaskFailure::new(
                        FailureKind::Timeout,
                        format!("Task execution timed out after {:?}", limit),
                    );
                    return Execution {
                        outcome: Err(ExecutionFailure {
                            retryable: failure.is_retryable(),
                            failure,
                        }),
                        elapsed: started.elapsed(),
                    };
                }
            },
            None => join.await,
        };

        let outcome = match joined {
            Ok(result) => result.map_err(ExecutionFailure::from),
            Err(e) => {
                let message = if e.is_panic() {
                    "Task panicked during execution"
                } else {
                    "Task was cancelled"
                };
                error!(task_id = %task.id, "{}", message);
                let failure = TaskFailure::execution(message);
                Err(ExecutionFailure {
                    retryable: failure.is_retryable(),
                    failure,
                })
            }
        };

        Execution {
            outcome,
            elapsed: started.elapsed(),
        }
    }
}
