use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ProbeError;

/// One age/rate point of the probe's rate curve.
///
/// A flow older than `age` emits at most one update event per `rate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub age: Duration,
    pub rate: Duration,
}

impl CurvePoint {
    pub const fn new(age: Duration, rate: Duration) -> Self {
        Self { age, rate }
    }
}

/// Probe configuration: the three-point rate curve written to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub curve: [CurvePoint; 3],
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            curve: [
                CurvePoint::new(Duration::ZERO, Duration::from_secs(20)),
                CurvePoint::new(Duration::from_secs(60), Duration::from_secs(60)),
                CurvePoint::new(Duration::from_secs(300), Duration::from_secs(300)),
            ],
        }
    }
}

impl ProbeConfig {
    /// Replace zero fields with their defaults.
    ///
    /// `curve[0].age` is left alone: zero is its default, and raising it
    /// is how operators ignore flows younger than a given age.
    pub fn with_defaults(mut self) -> Self {
        let def = Self::default();
        if self.curve[0].rate.is_zero() {
            self.curve[0].rate = def.curve[0].rate;
        }
        for i in 1..3 {
            if self.curve[i].age.is_zero() {
                self.curve[i].age = def.curve[i].age;
            }
            if self.curve[i].rate.is_zero() {
                self.curve[i].rate = def.curve[i].rate;
            }
        }
        self
    }

    /// Curve point ages must be strictly increasing; the kernel selects
    /// the applicable point by age threshold comparison.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.curve[0].age >= self.curve[1].age
            || self.curve[0].age >= self.curve[2].age
            || self.curve[1].age >= self.curve[2].age
        {
            return Err(ProbeError::InvalidCurve);
        }
        Ok(())
    }
}
