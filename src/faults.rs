use crate::event_model::Event;
use rand::Rng;
use std::time::Duration;

/// Decides, per delivery, whether the processor fails and how long it stalls.
pub trait FaultSource: Send + Sync {
    /// Simulated fault before any work is done.
    fn fail_before_processing(&self, event: &Event) -> bool;

    /// Simulated processing latency.
    fn processing_delay(&self, event: &Event) -> Duration;

    /// Simulated fault after the latency has elapsed.
    fn fail_after_processing(&self, event: &Event) -> bool;
}

/// Probabilities and latency bound used by [`RandomFaults`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultProfile {
    pub fail_before_probability: f64,
    pub fail_after_probability: f64,
    pub max_delay: Duration,
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            fail_before_probability: 0.1,
            fail_after_probability: 0.1,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl FaultProfile {
    /// Profile that never fails and never stalls.
    pub fn none() -> Self {
        Self {
            fail_before_probability: 0.0,
            fail_after_probability: 0.0,
            max_delay: Duration::ZERO,
        }
    }
}

/// Independent random draws per delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomFaults {
    profile: FaultProfile,
}

impl RandomFaults {
    pub fn new(profile: FaultProfile) -> Self {
        Self { profile }
    }
}

impl FaultSource for RandomFaults {
    fn fail_before_processing(&self, _event: &Event) -> bool {
        draw(self.profile.fail_before_probability)
    }

    fn processing_delay(&self, _event: &Event) -> Duration {
        let max_ms = self.profile.max_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    fn fail_after_processing(&self, _event: &Event) -> bool {
        draw(self.profile.fail_after_probability)
    }
}

fn draw(probability: f64) -> bool {
    probability > 0.0 && rand::thread_rng().gen_bool(probability.min(1.0))
}
