use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use taskq_core::{Result, TaskError, TaskPayload};
use thiserror::Error;

/// Failure reported by a handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Worth another attempt (network blip, busy resource, ...)
    #[error("{0}")]
    Transient(String),
    /// Retrying cannot help (malformed payload, ...)
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

impl From<HandlerError> for TaskError {
    fn from(err: HandlerError) -> Self {
        TaskError::HandlerExecution(err.to_string())
    }
}

/// Result type for task handlers
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// Trait for task handlers
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task with the given payload
    async fn execute(&self, payload: TaskPayload) -> HandlerResult;
}

/// Adapts a synchronous closure into a handler
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(TaskPayload) -> HandlerResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnHandler(f)
    }
}

#[async_trait]
impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(TaskPayload) -> HandlerResult + Send + Sync,
{
    async fn execute(&self, payload: TaskPayload) -> HandlerResult {
        (self.0)(payload)
    }
}

/// Task type name to handler bindings.
///
/// Populated once at startup, then frozen behind an `Arc` and handed to the
/// processor; lookups after that are plain reads.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task handler for a specific task type, replacing any previous binding
    pub fn register<H: TaskHandler + 'static>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<&mut Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TaskError::InvalidTask("task type must not be empty".into()));
        }
        self.handlers.insert(name, Arc::new(handler));
        Ok(self)
    }

    /// Get the handler for a task type
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn TaskHandler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| TaskError::HandlerNotFound(name.to_string()))
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered task types, sorted
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
