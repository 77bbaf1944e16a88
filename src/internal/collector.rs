use super::events::{Event, Events};
use super::job::JobResult;
use async_channel::Receiver;
use std::time::Instant;
use tokio::sync::mpsc;

/// Running outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl Tally {
    pub fn record(&mut self, result: &JobResult) {
        self.processed += 1;
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Consumes results until the last worker is gone and feeds failure
/// timestamps to the supervisor.
pub struct Collector {
    results: Receiver<JobResult>,
    failures: mpsc::UnboundedSender<Instant>,
    events: Events,
}

impl Collector {
    pub fn new(
        results: Receiver<JobResult>,
        failures: mpsc::UnboundedSender<Instant>,
        events: Events,
    ) -> Collector {
        Collector {
            results,
            failures,
            events,
        }
    }

    pub async fn run(self) -> Tally {
        let mut tally = Tally::default();

        while let Ok(result) = self.results.recv().await {
            tally.record(&result);
            if !result.is_success() {
                // the supervisor stops listening once shutdown is underway
                let _ = self.failures.send(result.completed_at);
            }
            self.events.emit(Event::JobCompleted {
                job: result.job_id,
                worker: result.worker_id,
                success: result.is_success(),
                duration: result.duration,
                error: result.error,
            });
        }

        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::job::{JobError, JobId, WorkerId};
    use std::time::Duration;

    fn result(id: u64, error: Option<JobError>) -> JobResult {
        JobResult {
            job_id: JobId(id),
            worker_id: WorkerId(1),
            error,
            duration: Duration::from_millis(1),
            completed_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn tallies_until_stream_closes() {
        let (tx, rx) = async_channel::unbounded();
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(Collector::new(rx, failures_tx, Events::default()).run());

        tx.send(result(1, None)).await.unwrap();
        tx.send(result(2, Some(JobError::Failed("bad".into()))))
            .await
            .unwrap();
        tx.send(result(3, None)).await.unwrap();
        drop(tx);

        let tally = collector.await.unwrap();
        assert_eq!(
            Tally {
                processed: 3,
                succeeded: 2,
                failed: 1
            },
            tally
        );

        assert!(failures_rx.recv().await.is_some());
        assert!(failures_rx.recv().await.is_none(), "one failure forwarded");
    }

    #[tokio::test]
    async fn missing_supervisor_is_not_fatal() {
        let (tx, rx) = async_channel::unbounded();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        drop(failures_rx);
        let collector = tokio::spawn(Collector::new(rx, failures_tx, Events::default()).run());

        tx.send(result(1, Some(JobError::Panicked))).await.unwrap();
        drop(tx);

        assert_eq!(1, collector.await.unwrap().failed);
    }
}
