use super::config::ConfigError;
use super::job::{Job, JobError};
use super::worker::Handler;
use async_trait::async_trait;
use rand::RngExt;
use std::time::Duration;

/// Demo workload: sleeps for `process_ms` give or take `jitter_ms`, and
/// fails with probability `error_rate`.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    process_ms: u64,
    jitter_ms: u64,
    error_rate: f64,
}

impl SimulatedWork {
    pub fn new(
        process_ms: u64,
        jitter_ms: u64,
        error_rate: f64,
    ) -> Result<SimulatedWork, ConfigError> {
        if !(0.0..=1.0).contains(&error_rate) {
            return Err(ConfigError::ErrorRate(error_rate));
        }
        Ok(SimulatedWork {
            process_ms,
            jitter_ms,
            error_rate,
        })
    }

    /// Work time is derived from the job's payload so a job always costs the same.
    pub fn work_time(&self, job: &Job) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::from_millis(self.process_ms);
        }
        let span = self.jitter_ms.saturating_mul(2).saturating_add(1);
        let offset = job.payload() % span;
        let millis = self
            .process_ms
            .saturating_add(offset)
            .saturating_sub(self.jitter_ms);
        Duration::from_millis(millis)
    }
}

#[async_trait]
impl Handler for SimulatedWork {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        tokio::time::sleep(self.work_time(job)).await;

        let failed = rand::rng().random_bool(self.error_rate);
        if failed {
            return Err(JobError::Failed(format!("simulated failure on {}", job.id())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::job::JobId;

    #[test]
    fn rejects_out_of_range_error_rate() {
        assert_eq!(
            Some(ConfigError::ErrorRate(1.5)),
            SimulatedWork::new(10, 0, 1.5).err()
        );
        assert!(SimulatedWork::new(10, 0, -0.1).is_err());
        assert!(SimulatedWork::new(10, 0, f64::NAN).is_err());
    }

    #[test]
    fn work_time_stays_within_jitter() {
        let work = SimulatedWork::new(50, 20, 0.0).unwrap();
        for payload in 0..200 {
            let t = work.work_time(&Job::new(JobId(1), payload));
            assert!(t >= Duration::from_millis(30) && t <= Duration::from_millis(70));
        }
    }

    #[test]
    fn jitter_never_goes_negative() {
        let work = SimulatedWork::new(5, 20, 0.0).unwrap();
        assert_eq!(Duration::ZERO, work.work_time(&Job::new(JobId(1), 0)));
    }

    #[test]
    fn huge_durations_saturate() {
        let work = SimulatedWork::new(u64::MAX, u64::MAX, 0.0).unwrap();
        for payload in [0, 1, u64::MAX / 2, u64::MAX] {
            work.work_time(&Job::new(JobId(1), payload));
        }

        let work = SimulatedWork::new(u64::MAX, 10, 0.0).unwrap();
        assert_eq!(
            Duration::from_millis(u64::MAX - 10),
            work.work_time(&Job::new(JobId(1), 0))
        );
    }

    #[tokio::test]
    async fn error_rate_extremes() {
        let job = Job::new(JobId(1), 0);

        let never = SimulatedWork::new(0, 0, 0.0).unwrap();
        let always = SimulatedWork::new(0, 0, 1.0).unwrap();
        for _ in 0..20 {
            assert_eq!(Ok(()), never.handle(&job).await);
            assert!(always.handle(&job).await.is_err());
        }
    }
}
