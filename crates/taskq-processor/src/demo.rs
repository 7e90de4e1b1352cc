//! Simulated handlers and the fixed workload run by the `taskq` binary.

use crate::handler::{HandlerError, HandlerRegistry, HandlerResult, TaskHandler};
use crate::processor::TaskProcessor;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use taskq_core::{Priority, Result, TaskError, TaskPayload};
use tracing::debug;

/// Largest accepted multiplier for the simulated latencies
pub const MAX_LATENCY_SCALE: f64 = 1000.0;

/// Which simulated job a handler performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    SendEmail,
    GenerateReport,
    ProcessImage,
    SyncData,
    Cleanup,
}

impl Job {
    pub const ALL: [Job; 5] = [
        Job::SendEmail,
        Job::GenerateReport,
        Job::ProcessImage,
        Job::SyncData,
        Job::Cleanup,
    ];

    pub fn task_name(&self) -> &'static str {
        match self {
            Job::SendEmail => "send_email",
            Job::GenerateReport => "generate_report",
            Job::ProcessImage => "process_image",
            Job::SyncData => "sync_data",
            Job::Cleanup => "cleanup",
        }
    }

    /// Nominal run time before scaling
    fn latency(&self) -> Duration {
        match self {
            Job::SendEmail | Job::Cleanup => Duration::from_secs(1),
            Job::GenerateReport | Job::SyncData => Duration::from_secs(2),
            Job::ProcessImage => Duration::from_secs(3),
        }
    }

    fn output(&self, payload: &TaskPayload) -> Value {
        let field = |key: &str| payload.get(key).cloned().unwrap_or(Value::Null);
        let timestamp = Utc::now().to_rfc3339();

        match self {
            Job::SendEmail => json!({
                "status": "sent",
                "to": field("to"),
                "subject": field("subject"),
                "timestamp": timestamp,
            }),
            Job::GenerateReport => json!({
                "status": "generated",
                "report_type": field("report_type"),
                "filename": format!("report_{}.pdf", Utc::now().timestamp()),
                "size_mb": 2.5,
                "timestamp": timestamp,
            }),
            Job::ProcessImage => {
                let path = payload.get("image_path").and_then(Value::as_str).unwrap_or_default();
                json!({
                    "status": "processed",
                    "original_path": path,
                    "output_path": format!("processed_{}", path),
                    "filters_applied": payload.get("filters").cloned().unwrap_or_else(|| json!([])),
                    "timestamp": timestamp,
                })
            }
            Job::SyncData => json!({
                "status": "synced",
                "source": field("source"),
                "destination": field("destination"),
                "records_synced": 1000,
                "timestamp": timestamp,
            }),
            Job::Cleanup => json!({
                "status": "cleaned",
                "target": field("target"),
                "items_removed": 500,
                "timestamp": timestamp,
            }),
        }
    }
}

/// Sleeps for the job's scaled latency, then echoes payload fields back
pub struct SimulatedHandler {
    job: Job,
    latency_scale: f64,
    failure_rate: f64,
}

impl SimulatedHandler {
    /// `latency_scale` is clamped to `0.0..=MAX_LATENCY_SCALE`; non-finite values disable the sleep
    pub fn new(job: Job, latency_scale: f64) -> Self {
        let latency_scale = if latency_scale.is_finite() {
            latency_scale.clamp(0.0, MAX_LATENCY_SCALE)
        } else {
            0.0
        };
        SimulatedHandler {
            job,
            latency_scale,
            failure_rate: 0.0,
        }
    }

    /// Fail transiently with probability `rate` (0.0..=1.0); NaN disables failures
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }
}

#[async_trait]
impl TaskHandler for SimulatedHandler {
    async fn execute(&self, payload: TaskPayload) -> HandlerResult {
        debug!("Simulating {} for {:?}", self.job.task_name(), payload);

        let latency = self.job.latency().mul_f64(self.latency_scale);
        tokio::time::sleep(latency).await;

        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(HandlerError::Transient(format!(
                "simulated {} outage",
                self.job.task_name()
            )));
        }

        Ok(self.job.output(&payload))
    }
}

/// Bind every simulated job under its task name.
/// `sync_data` is flaky so the demo exercises the retry path.
pub fn register_demo_handlers(registry: &mut HandlerRegistry, latency_scale: f64) -> Result<()> {
    if !latency_scale.is_finite() || !(0.0..=MAX_LATENCY_SCALE).contains(&latency_scale) {
        return Err(TaskError::Config(format!(
            "latency_scale must be between 0 and {}, got {}",
            MAX_LATENCY_SCALE, latency_scale
        )));
    }

    for job in Job::ALL {
        let handler = SimulatedHandler::new(job, latency_scale);
        let handler = match job {
            Job::SyncData => handler.with_failure_rate(0.5),
            _ => handler,
        };
        registry.register(job.task_name(), handler)?;
    }
    Ok(())
}

/// Submit the fixed demo workload, including one task with no handler
pub fn submit_demo_workload(processor: &TaskProcessor) -> Result<()> {
    let tasks = [
        processor
            .task("send_email")
            .id("task_send_email")
            .priority(Priority::High)
            .arg("to", "user@example.com")
            .arg("subject", "Welcome!")
            .arg("body", "Thanks for signing up"),
        processor
            .task("generate_report")
            .id("task_generate_report")
            .priority(Priority::Medium)
            .arg("report_type", "sales")
            .arg("date_range", "2025-01-01 to 2025-12-31"),
        processor
            .task("process_image")
            .id("task_process_image")
            .priority(Priority::Low)
            .arg("image_path", "/images/photo.jpg")
            .arg("filters", json!(["blur", "brightness", "contrast"])),
        processor
            .task("sync_data")
            .id("task_sync_data")
            .priority(Priority::High)
            .arg("source", "database_a")
            .arg("destination", "database_b"),
        processor
            .task("cleanup")
            .id("task_cleanup")
            .priority(Priority::Low)
            .arg("target", "/tmp/cache"),
        processor
            .task("send_sms")
            .id("task_send_sms")
            .priority(Priority::Medium)
            .arg("to", "+15550100"),
    ];

    for builder in tasks {
        processor.submit(builder.build()?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_handler_echoes_payload() {
        let handler = SimulatedHandler::new(Job::SendEmail, 0.0);
        let mut payload = TaskPayload::new();
        payload.insert("to".into(), json!("a@b.c"));

        let result = handler.execute(payload).await.unwrap();
        assert_eq!(result["status"], "sent");
        assert_eq!(result["to"], "a@b.c");
        assert_eq!(result["subject"], Value::Null);
    }

    #[tokio::test]
    async fn test_always_failing_handler() {
        let handler = SimulatedHandler::new(Job::SyncData, 0.0).with_failure_rate(1.0);
        let err = handler.execute(TaskPayload::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_demo_registry() {
        let mut registry = HandlerRegistry::new();
        register_demo_handlers(&mut registry, 0.0).unwrap();

        assert_eq!(
            registry.task_types(),
            ["cleanup", "generate_report", "process_image", "send_email", "sync_data"]
        );
        assert!(!registry.has_handler("send_sms"));
    }

    #[test]
    fn test_latency_scale_is_validated() {
        for scale in [f64::NAN, f64::INFINITY, -1.0, MAX_LATENCY_SCALE * 2.0] {
            let mut registry = HandlerRegistry::new();
            assert!(
                matches!(register_demo_handlers(&mut registry, scale), Err(TaskError::Config(_))),
                "scale {}",
                scale
            );
            assert!(registry.is_empty());
        }

        let mut registry = HandlerRegistry::new();
        register_demo_handlers(&mut registry, MAX_LATENCY_SCALE).unwrap();
        assert_eq!(registry.len(), Job::ALL.len());
    }

    #[tokio::test]
    async fn test_non_finite_settings_do_not_panic() {
        let handler = SimulatedHandler::new(Job::SyncData, f64::NAN).with_failure_rate(f64::NAN);
        assert!(handler.execute(TaskPayload::new()).await.is_ok());

        let handler = SimulatedHandler::new(Job::Cleanup, f64::INFINITY);
        assert!(handler.execute(TaskPayload::new()).await.is_ok());
    }
}
