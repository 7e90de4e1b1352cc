mod task;
mod priority;
mod error;
pub mod report;

pub use task::{
    FailureKind, Task, TaskBuilder, TaskFailure, TaskId, TaskPayload, TaskStatus,
    DEFAULT_MAX_RETRIES,
};
pub use priority::Priority;
pub use error::{TaskError, Result};
pub use report::{RunReport, RunSummary, TaskRecord};
