//! Requeue interval arithmetic.

use std::time::Duration;

/// How long a control loop waits before its next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval(Duration);

impl Interval {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn duration(self) -> Duration {
        self.0
    }

    /// Shorten to `max` if currently longer.
    pub fn reduce_to(self, max: Duration) -> Self {
        Self(self.0.min(max))
    }

    /// Lengthen to `min` if currently shorter.
    pub fn increase_to(self, min: Duration) -> Self {
        Self(self.0.max(min))
    }

    /// Multiply by `factor`, capped at `max`.
    pub fn backoff(self, factor: f64, max: Duration) -> Self {
        Self(self.0.mul_f64(factor.max(1.0)).min(max))
    }
}

impl From<Duration> for Interval {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}
