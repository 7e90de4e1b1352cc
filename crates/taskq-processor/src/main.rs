use clap::Parser;
use comfy_table::Table;
use std::path::PathBuf;
use taskq_core::{RunSummary, TaskRecord, TaskStatus};
use taskq_processor::demo::{register_demo_handlers, submit_demo_workload};
use taskq_processor::{DispatchMode, HandlerRegistry, ProcessorConfig, TaskProcessor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "taskq")]
#[command(about = "In-process priority task queue demo", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Where to write the JSON results
    #[arg(short, long, default_value = "task_results.json")]
    output: PathBuf,

    /// Dispatch mode (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<DispatchMode>,

    /// Pool size for `--mode pool`
    #[arg(short, long)]
    workers: Option<usize>,

    /// Multiplier for the simulated handler latencies
    #[arg(long, default_value = "1.0")]
    latency_scale: f64,

    /// Only list tasks that ended in this status
    #[arg(long)]
    status: Option<TaskStatus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ProcessorConfig::from_file(config_path)?
    } else {
        ProcessorConfig::default()
    };

    // Override with CLI args
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    let mut registry = HandlerRegistry::new();
    register_demo_handlers(&mut registry, args.latency_scale)?;

    let processor = TaskProcessor::new(config, registry)?;
    submit_demo_workload(&processor)?;
    tracing::info!("Submitted {} tasks", processor.queue_depth());

    let report = processor.run().await?;

    println!("{}", render(&processor.list_tasks(args.status), &report.summary));

    report.write_to(&args.output)?;
    tracing::info!("Results written to {}", args.output.display());

    Ok(())
}

fn render(records: &[TaskRecord], summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Task", "Type", "Priority", "Status", "Attempts", "Outcome"]);

    for record in records {
        let outcome = match (&record.result, &record.error) {
            (Some(result), _) => result
                .get("status")
                .and_then(|status| status.as_str())
                .unwrap_or_default()
                .to_string(),
            (None, Some(error)) => error.message.clone(),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            record.id.clone(),
            record.name.clone(),
            record.priority.to_string(),
            record.status.to_string(),
            record.attempts.to_string(),
            outcome,
        ]);
    }

    table.add_row(vec![
        "total".to_string(),
        summary.total.to_string(),
        String::new(),
        format!("{} ok / {} failed", summary.completed, summary.failed),
        summary.retries.to_string(),
        format!(
            "{:.0}% success in {} ms",
            summary.success_rate * 100.0,
            summary.elapsed_ms
        ),
    ]);
    table
}
