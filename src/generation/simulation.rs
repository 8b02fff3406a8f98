use crate::config::SimulationConfig;
use rand::Rng;
use std::time::Duration;

/// Decides how the stand-in model behaves: how long a request takes and
/// whether it reports overload.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPolicy {
    failure_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        Self::from(&SimulationConfig::default())
    }
}

impl From<&SimulationConfig> for SimulationPolicy {
    fn from(config: &SimulationConfig) -> Self {
        Self::new(config.failure_rate, config.min_latency, config.max_latency)
    }
}

impl SimulationPolicy {
    /// Rates outside `[0, 1]` are clamped; a reversed latency range is swapped.
    pub fn new(failure_rate: f64, min_latency: Duration, max_latency: Duration) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        let (min_latency, max_latency) = if min_latency <= max_latency {
            (min_latency, max_latency)
        } else {
            (max_latency, min_latency)
        };
        Self {
            failure_rate,
            min_latency,
            max_latency,
        }
    }

    pub fn always_succeed() -> Self {
        Self::new(0.0, Duration::ZERO, Duration::ZERO)
    }

    pub fn always_overloaded() -> Self {
        Self::new(1.0, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_latency(self, min: Duration, max: Duration) -> Self {
        Self::new(self.failure_rate, min, max)
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    pub fn sample_latency(&self) -> Duration {
        if self.min_latency == self.max_latency {
            return self.min_latency;
        }
        let min = self.min_latency.as_micros() as u64;
        let max = self.max_latency.as_micros() as u64;
        Duration::from_micros(rand::thread_rng().gen_range(min..=max))
    }

    pub fn roll_overload(&self) -> bool {
        rand::thread_rng().gen_bool(self.failure_rate)
    }
}
