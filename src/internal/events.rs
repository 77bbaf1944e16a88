use super::job::{JobError, JobId, WorkerId};
use super::shutdown::ShutdownReason;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything the pipeline reports to the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    WorkerStarted {
        worker: WorkerId,
    },
    WorkerStopRequested {
        worker: WorkerId,
    },
    WorkerExited {
        worker: WorkerId,
    },
    ScaledUp {
        from: usize,
        to: usize,
        occupancy: usize,
    },
    ScaledDown {
        from: usize,
        to: usize,
        occupancy: usize,
    },
    JobCompleted {
        job: JobId,
        worker: WorkerId,
        success: bool,
        duration: Duration,
        error: Option<JobError>,
    },
    AutoShutdownTriggered {
        errors: usize,
        window: Duration,
    },
    WorkerForceTerminated {
        worker: WorkerId,
    },
    ProducerStopped {
        enqueued: u64,
    },
    Summary {
        reason: ShutdownReason,
        enqueued: u64,
        processed: u64,
        errors: u64,
    },
}

impl Event {
    fn log(&self) {
        match self {
            Event::WorkerStarted { worker } => info!(worker = %worker, "worker started"),
            Event::WorkerStopRequested { worker } => {
                info!(worker = %worker, "worker stop requested")
            }
            Event::WorkerExited { worker } => info!(worker = %worker, "worker exited"),
            Event::ScaledUp {
                from,
                to,
                occupancy,
            } => info!(from, to, occupancy, "scale up"),
            Event::ScaledDown {
                from,
                to,
                occupancy,
            } => info!(from, to, occupancy, "scale down"),
            Event::JobCompleted {
                job,
                worker,
                success: true,
                duration,
                ..
            } => debug!(
                job = %job,
                worker = %worker,
                duration_ms = duration.as_millis() as u64,
                "job succeeded"
            ),
            Event::JobCompleted {
                job,
                worker,
                duration,
                error,
                ..
            } => warn!(
                job = %job,
                worker = %worker,
                duration_ms = duration.as_millis() as u64,
                error = ?error,
                "job failed"
            ),
            Event::AutoShutdownTriggered { errors, window } => warn!(
                errors,
                window_ms = window.as_millis() as u64,
                "error rate exceeded, auto-shutdown triggered"
            ),
            Event::WorkerForceTerminated { worker } => {
                warn!(worker = %worker, "worker missed shutdown grace period, force terminated")
            }
            Event::ProducerStopped { enqueued } => info!(enqueued, "producer stopped"),
            Event::Summary {
                reason,
                enqueued,
                processed,
                errors,
            } => info!(reason = ?reason, enqueued, processed, errors, "pipeline finished"),
        }
    }
}

pub type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

/// Sink shared by every component. Each event is logged through `tracing`
/// before it reaches the callback.
#[derive(Clone)]
pub struct Events {
    pub on_event: Arc<EventCallback>,
}

impl Events {
    pub fn new(on_event: EventCallback) -> Events {
        Events {
            on_event: Arc::new(on_event),
        }
    }

    pub fn emit(&self, event: Event) {
        event.log();
        (self.on_event)(&event);
    }
}

impl Default for Events {
    fn default() -> Events {
        Events::new(Box::new(|_| {}))
    }
}
