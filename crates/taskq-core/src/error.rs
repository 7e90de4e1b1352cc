use crate::TaskStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("No handler registered for task type: {0}")]
    HandlerNotFound(String),

    #[error("Handler execution failed: {0}")]
    HandlerExecution(String),

    #[error("Task {task_id} exhausted its retries after {attempts} attempts")]
    RetriesExhausted { task_id: String, attempts: u32 },

    #[error("Dequeue attempted on an empty queue")]
    EmptyQueue,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task already exists: {0}")]
    TaskAlreadyExists(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;
