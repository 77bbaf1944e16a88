use super::collector::{Collector, Tally};
use super::config::{ConfigError, PipelineConfig};
use super::error_window::ErrorWindow;
use super::events::{Event, Events};
use super::job::WorkerId;
use super::pool::WorkerPool;
use super::producer::{Producer, ProducerReport};
use super::scaling::ScalingPolicy;
use super::shutdown::{Shutdown, ShutdownReason};
use super::supervisor::{Supervisor, SupervisorReport, SupervisorSettings};
use super::worker::Handler;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline task failed: {0}")]
    Join(#[from] JoinError),
}

/// Final tallies once every component has quiesced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub reason: ShutdownReason,
    pub enqueued: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub errors: u64,
    pub forced_terminations: Vec<WorkerId>,
}

impl Summary {
    /// No worker had to be aborted.
    pub fn is_clean(&self) -> bool {
        self.forced_terminations.is_empty()
    }
}

pub struct Pipeline<H> {
    config: PipelineConfig,
    handler: Arc<H>,
    events: Events,
}

impl<H: Handler> Pipeline<H> {
    /// Validates the configuration. Nothing is started on error.
    pub fn new(
        config: PipelineConfig,
        handler: H,
        events: Events,
    ) -> Result<Pipeline<H>, PipelineError> {
        config.validate()?;
        Ok(Pipeline {
            config,
            handler: Arc::new(handler),
            events,
        })
    }

    /// Spawns producer, supervisor (and through it the workers) and collector.
    pub fn start(self, shutdown: &Shutdown<'_>) -> RunningPipeline {
        let config = self.config;
        let (jobs_tx, jobs_rx) = async_channel::bounded(config.queue_cap);
        let (results_tx, results_rx) = async_channel::unbounded();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let collector =
            tokio::spawn(Collector::new(results_rx, failures_tx, self.events.clone()).run());

        let pool = WorkerPool::new(jobs_rx, results_tx, self.handler, self.events.clone());
        let supervisor = Supervisor::new(
            pool,
            SupervisorSettings {
                policy: ScalingPolicy::from_config(&config),
                window: ErrorWindow::new(config.err_window, config.err_threshold),
                interval: config.scale_interval,
                grace: config.shutdown_grace,
            },
            jobs_tx.clone(),
            failures_rx,
            shutdown.get_signaler(),
            shutdown.trigger(),
            self.events.clone(),
        );
        let supervisor = tokio::spawn(supervisor.run());

        let producer = Producer::new(config.producer_rate, config.demo, config.max_jobs);
        let producer = tokio::spawn(producer.run(
            jobs_tx,
            shutdown.get_signaler(),
            shutdown.trigger(),
            self.events.clone(),
        ));

        RunningPipeline {
            producer,
            supervisor,
            collector,
            events: self.events,
        }
    }

    /// Starts the pipeline, waits for shutdown and for every component to finish.
    pub async fn run(self, shutdown: Shutdown<'_>) -> Result<Summary, PipelineError> {
        let running = self.start(&shutdown);
        let reason = shutdown.register_shutdown().await;
        running.join(reason).await
    }
}

pub struct RunningPipeline {
    producer: JoinHandle<ProducerReport>,
    supervisor: JoinHandle<SupervisorReport>,
    collector: JoinHandle<Tally>,
    events: Events,
}

impl RunningPipeline {
    pub async fn join(self, reason: ShutdownReason) -> Result<Summary, PipelineError> {
        let produced = self.producer.await?;
        let supervised = self.supervisor.await?;
        // the result stream closes once the last worker is gone
        let tally = self.collector.await?;

        let summary = Summary {
            reason,
            enqueued: produced.enqueued,
            processed: tally.processed,
            succeeded: tally.succeeded,
            errors: tally.failed,
            forced_terminations: supervised.forced,
        };
        self.events.emit(Event::Summary {
            reason: summary.reason,
            enqueued: summary.enqueued,
            processed: summary.processed,
            errors: summary.errors,
        });
        Ok(summary)
    }
}
