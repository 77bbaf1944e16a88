//! Bounded job pipeline with a self-scaling worker pool and cooperative,
//! loss-free shutdown.

pub mod internal;

pub use internal::config::{ConfigError, PipelineConfig};
pub use internal::events::{Event, Events};
pub use internal::job::{Job, JobError, JobId, JobResult, WorkerId};
pub use internal::pipeline::{Pipeline, PipelineError, Summary};
pub use internal::shutdown::{Shutdown, ShutdownReason};
pub use internal::worker::Handler;
pub use internal::workload::SimulatedWork;
