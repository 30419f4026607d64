use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::controller::{
    check_finite, require_finite, require_positive, ActuationLimits, Controller, ControllerCore,
};
use super::history::DEFAULT_HISTORY_CAPACITY;
use super::params::ControllerParams;
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub dt: f64,
    /// Stimulation level while switched on, mA.
    pub on_amplitude: f64,
    /// Half-width of the dead band around the setpoint.
    pub hysteresis: f64,
    pub min_output: f64,
    pub max_output: f64,
    /// Ramp for on/off transitions, mA/s. `None` switches instantly.
    pub ramp_rate: Option<f64>,
    pub history_capacity: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            dt: 0.001,
            on_amplitude: 3.0,
            hysteresis: 0.05,
            min_output: 0.0,
            max_output: 5.0,
            ramp_rate: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ThresholdConfig {
    pub fn limits(&self) -> ActuationLimits {
        ActuationLimits { min: self.min_output, max: self.max_output }
    }

    pub fn validate(&self) -> ControlResult<()> {
        require_positive("dt", self.dt)?;
        require_finite("on_amplitude", self.on_amplitude)?;
        if !self.hysteresis.is_finite() || self.hysteresis < 0.0 {
            return Err(ControlError::config(format!(
                "hysteresis must be finite and >= 0, got {}",
                self.hysteresis
            )));
        }
        self.limits().validate()?;
        if let Some(rate) = self.ramp_rate {
            require_positive("ramp_rate", rate)?;
        }
        if self.history_capacity == 0 {
            return Err(ControlError::config("history_capacity must be >= 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// On/off controller with hysteresis
// ---------------------------------------------------------------------------

/// Switches stimulation on when the biomarker rises above
/// `setpoint + hysteresis` and off when it drops below
/// `setpoint - hysteresis`; inside the band it keeps its last state.
#[derive(Debug, Clone)]
pub struct ThresholdController {
    core: ControllerCore,
    on_amplitude: f64,
    hysteresis: f64,
    ramp_rate: Option<f64>,
    active: bool,
    prev_control: f64,
}

impl ThresholdController {
    pub fn new(config: ThresholdConfig) -> ControlResult<Self> {
        config.validate()?;
        let core = ControllerCore::new(config.dt, config.limits(), config.history_capacity)?;
        let prev_control = core.limits().min;
        Ok(Self {
            core,
            on_amplitude: config.on_amplitude,
            hysteresis: config.hysteresis,
            ramp_rate: config.ramp_rate,
            active: false,
            prev_control,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Controller for ThresholdController {
    fn compute_control(&mut self, measurement: f64, setpoint: f64) -> ControlResult<f64> {
        check_finite(measurement, setpoint)?;
        let error = measurement - setpoint;
        check_finite(error, setpoint)?;

        if error > self.hysteresis {
            self.active = true;
        } else if error < -self.hysteresis {
            self.active = false;
        }

        let limits = self.core.limits();
        let target = if self.active { self.on_amplitude } else { limits.min };
        let mut control = self.core.saturate(target);
        if let Some(rate) = self.ramp_rate {
            control = self.core.apply_rate_limit(control, self.prev_control, rate);
        }

        self.prev_control = control;
        self.core.record_step(control, error);
        Ok(control)
    }

    fn reset(&mut self) {
        self.active = false;
        self.prev_control = self.core.limits().min;
        self.core.reset();
        debug!("threshold controller reset");
    }

    fn get_params(&self) -> ControllerParams {
        let mut params = self
            .core
            .base_params()
            .with("strategy", "threshold")
            .with("on_amplitude", self.on_amplitude)
            .with("hysteresis", self.hysteresis)
            .with("rate_limited", self.ramp_rate.is_some());
        if let Some(rate) = self.ramp_rate {
            params.insert("ramp_rate", rate);
        }
        params
    }

    fn core(&self) -> &ControllerCore {
        &self.core
    }

    fn name(&self) -> &str {
        "ThresholdController"
    }
}

impl fmt::Display for ThresholdController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ThresholdController(on={} mA, hysteresis={})",
            self.on_amplitude, self.hysteresis
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_with_hysteresis() {
        let mut c = ThresholdController::new(ThresholdConfig::default()).unwrap();
        assert_eq!(c.compute_control(0.32, 0.3).unwrap(), 0.0, "inside band, starts off");
        assert_eq!(c.compute_control(0.4, 0.3).unwrap(), 3.0);
        assert_eq!(c.compute_control(0.28, 0.3).unwrap(), 3.0, "inside band, stays on");
        assert_eq!(c.compute_control(0.2, 0.3).unwrap(), 0.0);
    }

    #[test]
    fn amplitude_clamped_to_envelope() {
        let cfg = ThresholdConfig { on_amplitude: 9.0, ..Default::default() };
        let mut c = ThresholdController::new(cfg).unwrap();
        assert_eq!(c.compute_control(1.0, 0.3).unwrap(), 5.0);
    }

    #[test]
    fn ramp_limits_switch_on() {
        let cfg = ThresholdConfig { ramp_rate: Some(100.0), dt: 0.01, ..Default::default() };
        let mut c = ThresholdController::new(cfg).unwrap();
        let first = c.compute_control(1.0, 0.3).unwrap();
        assert!((first - 1.0).abs() < 1e-12);
        let second = c.compute_control(1.0, 0.3).unwrap();
        assert!((second - 2.0).abs() < 1e-12);
    }

    #[test]
    fn reset_switches_off() {
        let mut c = ThresholdController::new(ThresholdConfig::default()).unwrap();
        c.compute_control(1.0, 0.3).unwrap();
        assert!(c.is_active());
        c.reset();
        assert!(!c.is_active());
        assert_eq!(c.elapsed_time(), 0.0);
        assert!(c.get_history().0.is_empty());
    }

    #[test]
    fn rejects_bad_config() {
        let neg = ThresholdConfig { hysteresis: -0.1, ..Default::default() };
        assert!(ThresholdController::new(neg).is_err());
        let ramp = ThresholdConfig { ramp_rate: Some(0.0), ..Default::default() };
        assert!(ThresholdController::new(ramp).is_err());
    }
}
