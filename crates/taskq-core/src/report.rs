//! Final run report: one record per task plus the aggregate summary.

use crate::{Priority, Result, Task, TaskFailure, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Aggregate counters for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// completed / total, 0.0 for an empty run
    pub success_rate: f64,
    /// Retries scheduled across all tasks
    pub retries: usize,
    /// First dequeue to last terminal transition
    pub elapsed_ms: u64,
    /// Mean handler wall time of the attempts that completed a task
    pub average_execution_ms: Option<f64>,
}

/// Final state of a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_retries: u32,
    pub result: Option<Value>,
    pub error: Option<TaskFailure>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        TaskRecord {
            id: task.id.clone(),
            name: task.name.clone(),
            priority: task.priority,
            status: task.status,
            attempts: task.attempts,
            max_retries: task.max_retries,
            result: task.result.clone(),
            error: task.error.clone(),
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub tasks: Vec<TaskRecord>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(tasks: &[Task], summary: RunSummary) -> Self {
        RunReport {
            tasks: tasks.iter().map(TaskRecord::from).collect(),
            summary,
        }
    }

    pub fn get(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|record| record.id == id)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the report as pretty JSON, replacing any existing file
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
