pub mod config;
pub mod demo;
pub mod executor;
pub mod handler;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod stats;

pub use config::{DispatchMode, ProcessorConfig};
pub use handler::{FnHandler, HandlerError, HandlerRegistry, HandlerResult, TaskHandler};
pub use processor::{StatusCounts, TaskProcessor};
pub use retry::{RetryDecision, RetryPolicy};
pub use stats::StatsCollector;
