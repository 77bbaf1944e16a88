use super::events::{Event, Events};
use super::job::{Job, JobError, JobResult, WorkerId};
use super::shutdown::Signaler;
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Executes one job. Implemented by whatever workload the pipeline runs.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Processing,
    Terminated,
}

/// Worker state published for the supervisor. Written only by the worker.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> StateCell {
        StateCell(Arc::new(AtomicU8::new(WorkerState::Idle as u8)))
    }

    pub fn get(&self) -> WorkerState {
        match self.0.load(Ordering::SeqCst) {
            0 => WorkerState::Idle,
            1 => WorkerState::Processing,
            _ => WorkerState::Terminated,
        }
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

impl Default for StateCell {
    fn default() -> StateCell {
        StateCell::new()
    }
}

/// Why a worker left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    StopRequested,
    QueueDrained,
}

/// Everything the workers of one pool share.
pub struct WorkerContext<H> {
    pub jobs: Receiver<Job>,
    pub results: Sender<JobResult>,
    pub handler: Arc<H>,
    pub events: Events,
}

impl<H> Clone for WorkerContext<H> {
    fn clone(&self) -> WorkerContext<H> {
        WorkerContext {
            jobs: self.jobs.clone(),
            results: self.results.clone(),
            handler: Arc::clone(&self.handler),
            events: self.events.clone(),
        }
    }
}

pub struct Worker<H> {
    id: WorkerId,
    jobs: Receiver<Job>,
    results: Sender<JobResult>,
    stop: watch::Receiver<bool>,
    state: StateCell,
    handler: Arc<H>,
    events: Events,

    // shutdown reaches workers through queue closure; holding the signaler
    // keeps register_shutdown waiting until this worker is gone
    #[allow(dead_code)]
    signaler: Signaler,
}

impl<H: Handler> Worker<H> {
    pub fn new(
        id: WorkerId,
        context: WorkerContext<H>,
        stop: watch::Receiver<bool>,
        signaler: Signaler,
        state: StateCell,
    ) -> Worker<H> {
        Worker {
            id,
            jobs: context.jobs,
            results: context.results,
            stop,
            state,
            handler: context.handler,
            events: context.events,
            signaler,
        }
    }

    pub async fn run(mut self) -> WorkerExit {
        self.events.emit(Event::WorkerStarted { worker: self.id });

        let exit = loop {
            let job = tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => break WorkerExit::StopRequested,
                job = self.jobs.recv() => match job {
                    Ok(job) => job,
                    Err(async_channel::RecvError) => break WorkerExit::QueueDrained,
                },
            };

            self.state.set(WorkerState::Processing);
            let result = self.process(job).await;
            // the collector outlives every worker, a send error only means it is gone
            let _ = self.results.send(result).await;
            self.state.set(WorkerState::Idle);

            if *self.stop.borrow() {
                break WorkerExit::StopRequested;
            }
            if self.jobs.is_closed() && self.jobs.is_empty() {
                break WorkerExit::QueueDrained;
            }
        };

        self.state.set(WorkerState::Terminated);
        self.events.emit(Event::WorkerExited { worker: self.id });
        exit
    }

    async fn process(&self, job: Job) -> JobResult {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.handler.handle(&job))
            .catch_unwind()
            .await
            .unwrap_or(Err(JobError::Panicked));

        JobResult {
            job_id: job.id(),
            worker_id: self.id,
            error: outcome.err(),
            duration: started.elapsed(),
            completed_at: Instant::now(),
        }
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            // handle dropped, nobody can ask us to stop anymore
            return futures::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::job::JobId;
    use crate::internal::shutdown::{Shutdown, ShutdownReason};
    use std::time::Duration;

    struct SlowHandler {
        millis: u64,
    }

    #[async_trait]
    impl Handler for SlowHandler {
        async fn handle(&self, _job: &Job) -> Result<(), JobError> {
            tokio::time::sleep(Duration::from_millis(self.millis)).await;
            Ok(())
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl Handler for PanicHandler {
        async fn handle(&self, _job: &Job) -> Result<(), JobError> {
            panic!("boom")
        }
    }

    struct Fixture {
        jobs: Sender<Job>,
        results: Receiver<JobResult>,
        stop: watch::Sender<bool>,
        state: StateCell,
    }

    fn spawn_worker<H: Handler>(
        handler: H,
        shutdown: &Shutdown<'_>,
    ) -> (Fixture, tokio::task::JoinHandle<WorkerExit>) {
        let (jobs_tx, jobs_rx) = async_channel::bounded(10);
        let (results_tx, results_rx) = async_channel::unbounded();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = StateCell::new();

        let context = WorkerContext {
            jobs: jobs_rx,
            results: results_tx,
            handler: Arc::new(handler),
            events: Events::default(),
        };
        let worker = Worker::new(
            WorkerId(1),
            context,
            stop_rx,
            shutdown.get_signaler(),
            state.clone(),
        );
        let join = tokio::spawn(worker.run());

        (
            Fixture {
                jobs: jobs_tx,
                results: results_rx,
                stop: stop_tx,
                state,
            },
            join,
        )
    }

    async fn wait_for(state: &StateCell, wanted: WorkerState) {
        while state.get() != wanted {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn stop_mid_job_still_yields_result() {
        let shutdown = Shutdown::new(vec![]);
        let (fixture, join) = spawn_worker(SlowHandler { millis: 80 }, &shutdown);

        fixture.jobs.send(Job::new(JobId(7), 0)).await.unwrap();
        wait_for(&fixture.state, WorkerState::Processing).await;
        fixture.stop.send(true).unwrap();

        let exit = join.await.unwrap();
        assert_eq!(WorkerExit::StopRequested, exit);

        let result = fixture.results.try_recv().unwrap();
        assert_eq!(JobId(7), result.job_id);
        assert!(result.is_success());
        assert!(result.duration >= Duration::from_millis(80));
        assert!(fixture.results.try_recv().is_err(), "exactly one result");
    }

    #[tokio::test]
    async fn stop_after_job_leaves_rest_queued() {
        let shutdown = Shutdown::new(vec![]);
        let (fixture, join) = spawn_worker(SlowHandler { millis: 30 }, &shutdown);

        fixture.jobs.send(Job::new(JobId(1), 0)).await.unwrap();
        wait_for(&fixture.state, WorkerState::Processing).await;
        fixture.jobs.send(Job::new(JobId(2), 0)).await.unwrap();
        fixture.stop.send(true).unwrap();

        assert_eq!(WorkerExit::StopRequested, join.await.unwrap());
        assert_eq!(1, fixture.results.len());
        assert_eq!(1, fixture.jobs.len());
    }

    #[tokio::test]
    async fn idle_worker_stops_promptly() {
        let shutdown = Shutdown::new(vec![]);
        let (fixture, join) = spawn_worker(SlowHandler { millis: 1 }, &shutdown);

        fixture.stop.send(true).unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("idle worker should exit")
            .unwrap();
        assert_eq!(WorkerExit::StopRequested, exit);
        assert_eq!(WorkerState::Terminated, fixture.state.get());
        assert!(fixture.results.is_empty());
    }

    #[tokio::test]
    async fn shutdown_drains_buffered_jobs() {
        let shutdown = Shutdown::new(vec![]);
        let trigger = shutdown.trigger();
        let (fixture, join) = spawn_worker(SlowHandler { millis: 5 }, &shutdown);

        for i in 0..5 {
            fixture.jobs.send(Job::new(JobId(i), 0)).await.unwrap();
        }
        trigger.fire(ShutdownReason::Interrupted);
        fixture.jobs.close();

        assert_eq!(WorkerExit::QueueDrained, join.await.unwrap());
        assert_eq!(5, fixture.results.len());
    }

    #[tokio::test]
    async fn closed_queue_ends_worker() {
        let shutdown = Shutdown::new(vec![]);
        let (fixture, join) = spawn_worker(SlowHandler { millis: 1 }, &shutdown);

        fixture.jobs.send(Job::new(JobId(1), 0)).await.unwrap();
        fixture.jobs.close();

        assert_eq!(WorkerExit::QueueDrained, join.await.unwrap());
        assert_eq!(1, fixture.results.len());
    }

    #[tokio::test]
    async fn panicking_handler_reports_failure() {
        let shutdown = Shutdown::new(vec![]);
        let (fixture, join) = spawn_worker(PanicHandler, &shutdown);

        fixture.jobs.send(Job::new(JobId(3), 0)).await.unwrap();
        fixture.jobs.close();

        assert_eq!(WorkerExit::QueueDrained, join.await.unwrap());
        let result = fixture.results.try_recv().unwrap();
        assert_eq!(Some(JobError::Panicked), result.error);
    }
}
