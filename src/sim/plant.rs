use nalgebra::{Matrix2, RowVector2, Vector2};
use serde::{Deserialize, Serialize};

use super::integrator::rk4_step;
use crate::control::controller::{require_finite, require_positive};
use crate::error::ControlResult;

/// Source of the biomarker measurement driven by the actuation signal.
///
/// The loop driver only ever talks to this trait; anything from a
/// network simulator to recorded data can sit behind it.
pub trait Plant {
    /// Current measurement (normalized biomarker power).
    fn measure(&self) -> f64;

    /// Advance by `dt` with `actuation` (mA) held constant; returns the new
    /// measurement.
    fn step(&mut self, actuation: f64, dt: f64) -> f64;

    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// Linear reference model
// ---------------------------------------------------------------------------

/// Parameters of the two-pole suppression model used by [`LinearPlant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlantConfig {
    /// Unstimulated biomarker level.
    pub baseline: f64,
    /// Steady-state suppression per mA.
    pub gain: f64,
    /// s
    pub tau_fast: f64,
    /// s
    pub tau_slow: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            baseline: 0.8,
            gain: 0.15,
            tau_fast: 0.02,
            tau_slow: 0.1,
        }
    }
}

impl PlantConfig {
    pub fn validate(&self) -> ControlResult<()> {
        require_finite("plant baseline", self.baseline)?;
        require_finite("plant gain", self.gain)?;
        require_positive("plant tau_fast", self.tau_fast)?;
        require_positive("plant tau_slow", self.tau_slow)
    }
}

/// `x' = A x + B u`, `y = max(0, baseline + C x)`, integrated with RK4.
#[derive(Debug, Clone)]
pub struct LinearPlant {
    a: Matrix2<f64>,
    b: Vector2<f64>,
    c: RowVector2<f64>,
    baseline: f64,
    x: Vector2<f64>,
}

impl LinearPlant {
    pub fn new(a: Matrix2<f64>, b: Vector2<f64>, c: RowVector2<f64>, baseline: f64) -> Self {
        Self { a, b, c, baseline, x: Vector2::zeros() }
    }

    /// Stimulation drives a fast state, which drives a slow state that is
    /// subtracted from the baseline.
    pub fn from_config(cfg: &PlantConfig) -> ControlResult<Self> {
        cfg.validate()?;
        #[rustfmt::skip]
        let a = Matrix2::new(
            -1.0 / cfg.tau_fast, 0.0,
            1.0 / cfg.tau_slow, -1.0 / cfg.tau_slow,
        );
        let b = Vector2::new(cfg.gain / cfg.tau_fast, 0.0);
        let c = RowVector2::new(0.0, -1.0);
        Ok(Self::new(a, b, c, cfg.baseline))
    }

    pub fn state(&self) -> &Vector2<f64> {
        &self.x
    }
}

impl Plant for LinearPlant {
    fn measure(&self) -> f64 {
        (self.baseline + (self.c * self.x)[0]).max(0.0)
    }

    fn step(&mut self, actuation: f64, dt: f64) -> f64 {
        let (a, b) = (self.a, self.b);
        self.x = rk4_step(&self.x, actuation, dt, |x, u| a * x + b * u);
        self.measure()
    }

    fn reset(&mut self) {
        self.x = Vector2::zeros();
    }
}
