use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A unit of work. Immutable once the producer has built it.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    created_at: Instant,
    payload: u64,
}

impl Job {
    pub fn new(id: JobId, payload: u64) -> Job {
        Job {
            id,
            created_at: Instant::now(),
            payload,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Opaque work descriptor, interpreted only by the handler.
    pub fn payload(&self) -> u64 {
        self.payload
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("handler panicked")]
    Panicked,
}

/// Outcome of exactly one job, built by the worker that processed it.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub error: Option<JobError>,
    pub duration: Duration,
    pub completed_at: Instant,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
