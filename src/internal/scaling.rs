use super::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    ScaleUp,
    ScaleDown,
    Steady,
}

/// Occupancy thresholds and pool bounds. `low_water < high_water` is the
/// hysteresis band; inside it the pool is left alone.
#[derive(Debug, Clone, Copy)]
pub struct ScalingPolicy {
    pub min: usize,
    pub max: usize,
    pub high_water: usize,
    pub low_water: usize,
}

impl ScalingPolicy {
    pub fn from_config(config: &PipelineConfig) -> ScalingPolicy {
        ScalingPolicy {
            min: config.min_workers,
            max: config.max_workers,
            high_water: config.high_water,
            low_water: config.low_water,
        }
    }

    pub fn decide(&self, occupancy: usize, count: usize) -> ScalingDecision {
        if occupancy >= self.high_water && count < self.max {
            ScalingDecision::ScaleUp
        } else if occupancy <= self.low_water && count > self.min {
            ScalingDecision::ScaleDown
        } else {
            ScalingDecision::Steady
        }
    }
}

/// What the supervisor last saw and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingState {
    pub count: usize,
    pub occupancy: usize,
    pub last_action: ScalingDecision,
}

impl ScalingState {
    pub fn new(count: usize) -> ScalingState {
        ScalingState {
            count,
            occupancy: 0,
            last_action: ScalingDecision::Steady,
        }
    }

    /// Applies one tick. The count moves by at most one.
    pub fn apply(&mut self, policy: &ScalingPolicy, occupancy: usize) -> ScalingDecision {
        let decision = policy.decide(occupancy, self.count);
        match decision {
            ScalingDecision::ScaleUp => self.count += 1,
            ScalingDecision::ScaleDown => self.count -= 1,
            ScalingDecision::Steady => {}
        }
        self.occupancy = occupancy;
        self.last_action = decision;
        decision
    }
}
