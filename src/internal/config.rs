use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("min-workers must be at least 1")]
    NoWorkers,

    #[error("min-workers ({min}) is greater than max-workers ({max})")]
    WorkerBounds { min: usize, max: usize },

    #[error("queue-cap must be at least 1")]
    EmptyQueue,

    #[error("low-water ({low}) must be below high-water ({high})")]
    WaterMarks { low: usize, high: usize },

    #[error("high-water ({high}) exceeds queue-cap ({cap}), the pool could never scale up")]
    HighWaterAboveCapacity { high: usize, cap: usize },

    #[error("scale-interval must be greater than zero")]
    ZeroScaleInterval,

    #[error("producer-rate must be a finite, non-negative number, got {0}")]
    ProducerRate(f32),

    #[error("error-rate must be within [0, 1], got {0}")]
    ErrorRate(f64),

    #[error("err-window must be greater than zero")]
    ZeroErrorWindow,

    #[error("err-threshold must be at least 1")]
    ZeroErrorThreshold,

    #[error("shutdown grace period must be greater than zero")]
    ZeroGrace,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub queue_cap: usize,
    pub high_water: usize,
    pub low_water: usize,
    pub scale_interval: Duration,
    /// Jobs per second.
    pub producer_rate: f32,
    /// Variable producer rate.
    pub demo: bool,
    /// Stop producing after this many accepted jobs.
    pub max_jobs: Option<u64>,
    pub err_window: Duration,
    pub err_threshold: usize,
    /// How long a worker gets to finish once shutdown is raised.
    pub shutdown_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            min_workers: 1,
            max_workers: 8,
            queue_cap: 100,
            high_water: 70,
            low_water: 10,
            scale_interval: Duration::from_millis(500),
            producer_rate: 20.0,
            demo: false,
            max_jobs: None,
            err_window: Duration::from_secs(10),
            err_threshold: 20,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.min_workers > self.max_workers {
            return Err(ConfigError::WorkerBounds {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        if self.queue_cap == 0 {
            return Err(ConfigError::EmptyQueue);
        }
        if self.low_water >= self.high_water {
            return Err(ConfigError::WaterMarks {
                low: self.low_water,
                high: self.high_water,
            });
        }
        if self.high_water > self.queue_cap {
            return Err(ConfigError::HighWaterAboveCapacity {
                high: self.high_water,
                cap: self.queue_cap,
            });
        }
        if self.scale_interval.is_zero() {
            return Err(ConfigError::ZeroScaleInterval);
        }
        if !self.producer_rate.is_finite() || self.producer_rate < 0.0 {
            return Err(ConfigError::ProducerRate(self.producer_rate));
        }
        if self.err_window.is_zero() {
            return Err(ConfigError::ZeroErrorWindow);
        }
        if self.err_threshold == 0 {
            return Err(ConfigError::ZeroErrorThreshold);
        }
        if self.shutdown_grace.is_zero() {
            return Err(ConfigError::ZeroGrace);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> PipelineConfig {
        PipelineConfig {
            min_workers: 1,
            max_workers: 4,
            queue_cap: 10,
            high_water: 7,
            low_water: 2,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn default_is_valid() {
        assert_eq!(Ok(()), PipelineConfig::default().validate());
        assert_eq!(Ok(()), scenario().validate());
    }

    macro_rules! invalid_config_tests {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (tweak, expected): (fn(&mut PipelineConfig), ConfigError) = $value;
                let mut config = scenario();
                tweak(&mut config);
                assert_eq!(Err(expected), config.validate());
            }
        )*
        }
    }

    invalid_config_tests! {
        zero_min_workers: (|c| c.min_workers = 0, ConfigError::NoWorkers),
        min_above_max: (|c| c.min_workers = 5, ConfigError::WorkerBounds { min: 5, max: 4 }),
        zero_queue: (|c| { c.queue_cap = 0; }, ConfigError::EmptyQueue),
        low_equals_high: (|c| c.low_water = 7, ConfigError::WaterMarks { low: 7, high: 7 }),
        low_above_high: (|c| c.low_water = 9, ConfigError::WaterMarks { low: 9, high: 7 }),
        high_above_cap: (|c| c.high_water = 11, ConfigError::HighWaterAboveCapacity { high: 11, cap: 10 }),
        zero_interval: (|c| c.scale_interval = Duration::ZERO, ConfigError::ZeroScaleInterval),
        negative_rate: (|c| c.producer_rate = -1.0, ConfigError::ProducerRate(-1.0)),
        zero_window: (|c| c.err_window = Duration::ZERO, ConfigError::ZeroErrorWindow),
        zero_threshold: (|c| c.err_threshold = 0, ConfigError::ZeroErrorThreshold),
        zero_grace: (|c| c.shutdown_grace = Duration::ZERO, ConfigError::ZeroGrace),
    }

    #[test]
    fn nan_rate_is_rejected() {
        let mut config = scenario();
        config.producer_rate = f32::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::ProducerRate(_))));
    }
}
