use serde::{Deserialize, Serialize};

use super::history::{ControlHistory, DEFAULT_HISTORY_CAPACITY};
use super::params::ControllerParams;
use crate::error::{ControlError, ControlResult};

/// Trait for closed-loop stimulation controllers.
///
/// Implement this to create control strategies that can be plugged into
/// the simulation loop. The driver calls `compute_control` once per `dt`
/// and never needs to know which strategy it is talking to.
pub trait Controller {
    /// Compute the actuation (mA) for one step.
    ///
    /// Advances the clock by `dt` and appends one (control, error) pair.
    /// The returned value is already inside [`Controller::limits`]. A
    /// non-finite measurement or setpoint is rejected before any state is
    /// touched.
    fn compute_control(&mut self, measurement: f64, setpoint: f64) -> ControlResult<f64>;

    /// Restore construction-time state: clock, history and any
    /// strategy accumulators.
    fn reset(&mut self);

    /// Snapshot of `dt`, elapsed time and strategy parameters.
    fn get_params(&self) -> ControllerParams;

    /// Shared bookkeeping (clock, history, envelope).
    fn core(&self) -> &ControllerCore;

    /// Control and error series, oldest first, equal length.
    fn get_history(&self) -> (Vec<f64>, Vec<f64>) {
        self.core().get_history()
    }

    fn dt(&self) -> f64 {
        self.core().dt()
    }

    fn elapsed_time(&self) -> f64 {
        self.core().elapsed_time()
    }

    fn limits(&self) -> ActuationLimits {
        self.core().limits()
    }

    /// Human-readable name for logging/display.
    fn name(&self) -> &str {
        "unnamed"
    }
}

// ---------------------------------------------------------------------------
// Actuation envelope
// ---------------------------------------------------------------------------

/// Hard bounds on the actuation signal, in mA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuationLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for ActuationLimits {
    fn default() -> Self {
        Self { min: 0.0, max: 5.0 }
    }
}

impl ActuationLimits {
    pub fn new(min: f64, max: f64) -> ControlResult<Self> {
        let limits = Self { min, max };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> ControlResult<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ControlError::config(format!(
                "actuation bounds must be finite, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.min >= self.max {
            return Err(ControlError::config(format!(
                "actuation bounds inverted: min {} >= max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn clamp(&self, value: f64) -> f64 {
        apply_saturation(value, self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Numerical safety helpers
// ---------------------------------------------------------------------------

/// Clamp `value` to `[min, max]`. Values on a boundary come back as that
/// boundary exactly; NaN maps to `min` (no stimulation). Does not panic on
/// inverted bounds, unlike `f64::clamp`.
pub fn apply_saturation(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() || value <= min {
        min
    } else if value >= max {
        max
    } else {
        value
    }
}

/// Bound the step from `previous` to `value` by `max_step`.
///
/// When the requested change is larger, the result is `previous` moved by
/// exactly `max_step` towards `value`.
pub fn rate_limit(value: f64, previous: f64, max_step: f64) -> f64 {
    let delta = value - previous;
    if delta.abs() > max_step {
        previous + delta.signum() * max_step
    } else {
        value
    }
}

/// Reject NaN/Inf inputs before they reach any accumulator.
pub fn check_finite(measurement: f64, setpoint: f64) -> ControlResult<()> {
    if measurement.is_finite() && setpoint.is_finite() {
        Ok(())
    } else {
        Err(ControlError::NonFiniteInput { measurement, setpoint })
    }
}

pub(crate) fn require_positive(name: &str, value: f64) -> ControlResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ControlError::config(format!("{name} must be finite and > 0, got {value}")))
    }
}

pub(crate) fn require_finite(name: &str, value: f64) -> ControlResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ControlError::config(format!("{name} must be finite, got {value}")))
    }
}

// ---------------------------------------------------------------------------
// Shared controller bookkeeping
// ---------------------------------------------------------------------------

/// State every strategy carries: sample interval, clock, envelope and the
/// bounded control/error log.
#[derive(Debug, Clone)]
pub struct ControllerCore {
    dt: f64,
    time: f64,
    limits: ActuationLimits,
    history: ControlHistory,
}

impl ControllerCore {
    pub fn new(dt: f64, limits: ActuationLimits, history_capacity: usize) -> ControlResult<Self> {
        require_positive("dt", dt)?;
        limits.validate()?;
        if history_capacity == 0 {
            return Err(ControlError::config("history_capacity must be >= 1"));
        }
        Ok(Self {
            dt,
            time: 0.0,
            limits,
            history: ControlHistory::new(history_capacity),
        })
    }

    /// Core with default envelope and history capacity.
    pub fn with_dt(dt: f64) -> ControlResult<Self> {
        Self::new(dt, ActuationLimits::default(), DEFAULT_HISTORY_CAPACITY)
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn elapsed_time(&self) -> f64 {
        self.time
    }

    pub fn limits(&self) -> ActuationLimits {
        self.limits
    }

    pub fn history(&self) -> &ControlHistory {
        &self.history
    }

    pub fn update_time(&mut self) {
        self.time += self.dt;
    }

    pub fn log_control(&mut self, control: f64, error: f64) {
        self.history.push(control, error);
    }

    /// Clock tick plus history append; the tail of every successful step.
    pub fn record_step(&mut self, control: f64, error: f64) {
        self.update_time();
        self.log_control(control, error);
    }

    pub fn get_history(&self) -> (Vec<f64>, Vec<f64>) {
        (self.history.controls(), self.history.errors())
    }

    /// Hand buffered history to an external log without touching the clock.
    pub fn drain_history(&mut self) -> (Vec<f64>, Vec<f64>) {
        self.history.drain()
    }

    pub fn saturate(&self, value: f64) -> f64 {
        self.limits.clamp(value)
    }

    /// Bound `|value - previous| <= max_rate * dt` (`max_rate` in mA/s).
    pub fn apply_rate_limit(&self, value: f64, previous: f64, max_rate: f64) -> f64 {
        rate_limit(value, previous, max_rate * self.dt)
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
        self.history.clear();
    }

    /// Keys common to every strategy.
    pub fn base_params(&self) -> ControllerParams {
        ControllerParams::new()
            .with("dt", self.dt)
            .with("time", self.time)
            .with("min_output", self.limits.min)
            .with("max_output", self.limits.max)
            .with("history_capacity", self.history.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_returns_boundary_exactly() {
        assert_eq!(apply_saturation(5.0, 0.0, 5.0), 5.0);
        assert_eq!(apply_saturation(51.00025, 0.0, 5.0), 5.0);
        assert_eq!(apply_saturation(-0.3, 0.0, 5.0), 0.0);
        assert_eq!(apply_saturation(2.5, 0.0, 5.0), 2.5);
        assert_eq!(apply_saturation(f64::NAN, 0.0, 5.0), 0.0);
        assert_eq!(apply_saturation(f64::INFINITY, 0.0, 5.0), 5.0);
    }

    #[test]
    fn rate_limit_steps_by_max_change() {
        let core = ControllerCore::with_dt(0.001).unwrap();
        // max_rate 2 mA/s at 1 kHz -> 0.002 mA per step
        let up = core.apply_rate_limit(5.0, 1.0, 2.0);
        assert!((up - 1.002).abs() < 1e-12);
        let down = core.apply_rate_limit(0.0, 1.0, 2.0);
        assert!((down - 0.998).abs() < 1e-12);
        let within = core.apply_rate_limit(1.001, 1.0, 2.0);
        assert_eq!(within, 1.001);
    }

    #[test]
    fn non_finite_inputs_rejected() {
        assert!(check_finite(0.5, 0.3).is_ok());
        assert!(check_finite(f64::NAN, 0.3).is_err());
        assert!(check_finite(0.5, f64::INFINITY).is_err());
        assert!(check_finite(f64::NEG_INFINITY, 0.3).unwrap_err().is_invalid_input());
    }

    #[test]
    fn core_rejects_bad_construction() {
        assert!(ControllerCore::with_dt(0.0).is_err());
        assert!(ControllerCore::with_dt(-0.001).is_err());
        assert!(ControllerCore::with_dt(f64::NAN).is_err());
        let inverted = ActuationLimits { min: 5.0, max: 0.0 };
        assert!(ControllerCore::new(0.001, inverted, 10).is_err());
        let equal = ActuationLimits { min: 1.0, max: 1.0 };
        assert!(ControllerCore::new(0.001, equal, 10).is_err());
        assert!(ControllerCore::new(0.001, ActuationLimits::default(), 0).is_err());
    }

    #[test]
    fn record_step_advances_clock_and_history() {
        let mut core = ControllerCore::with_dt(0.01).unwrap();
        core.record_step(1.0, 0.2);
        core.record_step(2.0, 0.1);
        assert!((core.elapsed_time() - 0.02).abs() < 1e-12);
        let (c, e) = core.get_history();
        assert_eq!(c, vec![1.0, 2.0]);
        assert_eq!(e, vec![0.2, 0.1]);

        core.reset();
        assert_eq!(core.elapsed_time(), 0.0);
        assert!(core.history().is_empty());
    }
}
