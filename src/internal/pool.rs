use super::events::{Event, Events};
use super::job::{Job, JobResult, WorkerId};
use super::shutdown::Signaler;
use super::worker::{Handler, StateCell, Worker, WorkerContext, WorkerExit, WorkerState};
use async_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub struct WorkerHandle {
    id: WorkerId,
    stop: watch::Sender<bool>,
    state: StateCell,
    join: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    fn request_stop(&self) {
        self.stop.send_replace(true);
    }
}

/// Registry of live workers, keyed by id. Owned by the supervisor, which is
/// the only thing allowed to add or remove workers.
pub struct WorkerPool<H> {
    workers: BTreeMap<WorkerId, WorkerHandle>,
    next_id: u64,
    context: WorkerContext<H>,
}

impl<H: Handler> WorkerPool<H> {
    pub fn new(
        jobs: Receiver<Job>,
        results: Sender<JobResult>,
        handler: Arc<H>,
        events: Events,
    ) -> WorkerPool<H> {
        WorkerPool {
            workers: BTreeMap::new(),
            next_id: 1,
            context: WorkerContext {
                jobs,
                results,
                handler,
                events,
            },
        }
    }

    pub fn spawn(&mut self, signaler: Signaler) -> WorkerId {
        let id = WorkerId(self.next_id);
        self.next_id += 1;

        let (stop_tx, stop_rx) = watch::channel(false);
        let state = StateCell::new();
        let worker = Worker::new(id, self.context.clone(), stop_rx, signaler, state.clone());

        let join = tokio::spawn(worker.run());
        self.workers.insert(
            id,
            WorkerHandle {
                id,
                stop: stop_tx,
                state,
                join,
            },
        );
        id
    }

    /// Asks one worker to leave after its current job. Idle workers go first,
    /// newest first among equals.
    pub fn request_stop_one(&mut self) -> Option<WorkerId> {
        let candidate = self
            .workers
            .values()
            .rev()
            .filter(|w| !w.is_stopping())
            .min_by_key(|w| match w.state() {
                WorkerState::Idle => 0,
                _ => 1,
            })?;

        candidate.request_stop();
        let id = candidate.id;
        self.context
            .events
            .emit(Event::WorkerStopRequested { worker: id });
        Some(id)
    }

    /// Drops handles of workers whose task has ended.
    pub fn reap(&mut self) -> usize {
        let before = self.workers.len();
        self.workers.retain(|_, w| !w.is_finished());
        before - self.workers.len()
    }

    /// Workers not asked to stop. This is the count scaling decisions use.
    pub fn active(&self) -> usize {
        self.workers.values().filter(|w| !w.is_stopping()).count()
    }

    /// Workers whose task is still around, stopping or not.
    pub fn live(&self) -> usize {
        self.workers.len()
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerHandle> {
        self.workers.get(&id)
    }

    /// Waits for every worker until `grace` runs out, then aborts the rest.
    /// Returns the ids of the aborted workers.
    pub async fn shutdown(mut self, grace: Duration) -> Vec<WorkerId> {
        let deadline = Instant::now() + grace;
        let mut forced = Vec::new();

        for (id, mut handle) in std::mem::take(&mut self.workers) {
            match tokio::time::timeout_at(deadline, &mut handle.join).await {
                Ok(_) => {}
                Err(_) => {
                    handle.join.abort();
                    self.context
                        .events
                        .emit(Event::WorkerForceTerminated { worker: id });
                    forced.push(id);
                }
            }
        }
        forced
    }
}
