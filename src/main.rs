use clap::Parser;
use ebb::internal::shutdown::{CtrlInterrupter, Interrupter};
use ebb::{Events, Pipeline, PipelineConfig, Shutdown, SimulatedWork};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ebb")]
#[command(about = "Run a bounded job pipeline with an elastic worker pool")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "1")]
    min_workers: usize,

    #[arg(long, default_value = "8")]
    max_workers: usize,

    /// Job queue capacity
    #[arg(long, default_value = "100")]
    queue_cap: usize,

    /// Occupancy at or above which a worker is added
    #[arg(long, default_value = "70")]
    high_water: usize,

    /// Occupancy at or below which a worker is removed
    #[arg(long, default_value = "10")]
    low_water: usize,

    #[arg(long, default_value = "500")]
    scale_interval_ms: u64,

    /// Jobs per second
    #[arg(long, default_value = "20", allow_negative_numbers = true)]
    producer_rate: f32,

    #[arg(long, default_value = "200")]
    process_ms: u64,

    #[arg(long, default_value = "50")]
    jitter_ms: u64,

    /// Probability that a job fails
    #[arg(long, default_value = "0.05", allow_negative_numbers = true)]
    error_rate: f64,

    #[arg(long, default_value = "10000")]
    err_window_ms: u64,

    #[arg(long, default_value = "20")]
    err_threshold: usize,

    /// Stop after this many jobs have been enqueued
    #[arg(long)]
    jobs: Option<u64>,

    /// How long workers get to finish once shutdown starts
    #[arg(long, default_value = "5000")]
    shutdown_grace_ms: u64,

    /// Vary the producer rate over time
    #[arg(long)]
    demo: bool,

    #[arg(short, long, default_value = "info", env = "EBB_LOG")]
    log_level: String,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            queue_cap: self.queue_cap,
            high_water: self.high_water,
            low_water: self.low_water,
            scale_interval: Duration::from_millis(self.scale_interval_ms),
            producer_rate: self.producer_rate,
            demo: self.demo,
            max_jobs: self.jobs,
            err_window: Duration::from_millis(self.err_window_ms),
            err_threshold: self.err_threshold,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let work = SimulatedWork::new(cli.process_ms, cli.jitter_ms, cli.error_rate)?;
    let pipeline = Pipeline::new(cli.pipeline_config(), work, Events::default())?;

    let mut interrupters: Vec<Box<dyn Interrupter>> = vec![Box::new(CtrlInterrupter::new())];
    #[cfg(unix)]
    interrupters.push(Box::new(ebb::internal::shutdown::TerminateInterrupter::new()));
    let shutdown = Shutdown::new(interrupters);

    let summary = pipeline.run(shutdown).await?;

    if !summary.is_clean() {
        anyhow::bail!(
            "{} worker(s) did not stop within the grace period: {:?}",
            summary.forced_terminations.len(),
            summary.forced_terminations
        );
    }
    Ok(())
}
