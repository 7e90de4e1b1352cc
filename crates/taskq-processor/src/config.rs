use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskq_core::{Result, TaskError, DEFAULT_MAX_RETRIES};

/// How the processor drains its queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One consumer; a backoff sleep holds up every task behind it
    Sequential,
    /// `workers` consumers; backoff re-enqueues from a timer
    Pool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub default_max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub mode: DispatchMode,
    pub workers: usize,
    pub handler_timeout_ms: Option<u64>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            default_max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: 1000,
            max_delay_ms: 3_600_000,
            jitter: false,
            mode: DispatchMode::Sequential,
            workers: 4,
            handler_timeout_ms: None,
        }
    }
}

impl ProcessorConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ProcessorConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(TaskError::Config("base_delay_ms must be positive".into()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(TaskError::Config(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if self.workers == 0 {
            return Err(TaskError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(self.jitter)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }

    /// Worker count actually spawned for the configured mode
    pub fn effective_workers(&self) -> usize {
        match self.mode {
            DispatchMode::Sequential => 1,
            DispatchMode::Pool => self.workers,
        }
    }
}
