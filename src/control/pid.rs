use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::controller::{
    check_finite, require_finite, require_positive, ActuationLimits, Controller, ControllerCore,
};
use super::history::DEFAULT_HISTORY_CAPACITY;
use super::params::ControllerParams;
use super::tuning::{analyze_errors, TuningAdvice, ZieglerNichols, DIAGNOSTIC_WINDOW};
use crate::error::{ControlError, ControlResult};

// ---------------------------------------------------------------------------
// Gains and configuration
// ---------------------------------------------------------------------------

/// Proportional, integral and derivative gains. Replaced as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    pub fn validate(&self) -> ControlResult<()> {
        require_finite("kp", self.kp)?;
        require_finite("ki", self.ki)?;
        require_finite("kd", self.kd)
    }
}

/// Everything needed to build a [`PidController`]. Field names double as
/// the `[pid]` table keys in TOML configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Sample interval, s.
    pub dt: f64,
    pub anti_windup: bool,
    /// Bound on |integral| when `anti_windup` is set.
    pub windup_limit: f64,
    /// mA
    pub min_output: f64,
    /// mA
    pub max_output: f64,
    /// Maximum actuation slew, mA/s. `None` leaves rate limiting off.
    pub rate_limit: Option<f64>,
    pub history_capacity: usize,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.5,
            kd: 0.1,
            dt: 0.001,
            anti_windup: true,
            windup_limit: 10.0,
            min_output: 0.0,
            max_output: 5.0,
            rate_limit: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl PidConfig {
    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp, self.ki, self.kd)
    }

    pub fn limits(&self) -> ActuationLimits {
        ActuationLimits { min: self.min_output, max: self.max_output }
    }

    pub fn validate(&self) -> ControlResult<()> {
        self.gains().validate()?;
        require_positive("dt", self.dt)?;
        require_positive("windup_limit", self.windup_limit)?;
        self.limits().validate()?;
        if let Some(rate) = self.rate_limit {
            require_positive("rate_limit", rate)?;
        }
        if self.history_capacity == 0 {
            return Err(ControlError::config("history_capacity must be >= 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PID builder
// ---------------------------------------------------------------------------

pub struct PidBuilder {
    config: PidConfig,
}

impl PidBuilder {
    pub fn new() -> Self {
        Self { config: PidConfig::default() }
    }

    pub fn kp(mut self, v: f64) -> Self {
        self.config.kp = v;
        self
    }

    pub fn ki(mut self, v: f64) -> Self {
        self.config.ki = v;
        self
    }

    pub fn kd(mut self, v: f64) -> Self {
        self.config.kd = v;
        self
    }

    pub fn dt(mut self, v: f64) -> Self {
        self.config.dt = v;
        self
    }

    pub fn anti_windup(mut self, v: bool) -> Self {
        self.config.anti_windup = v;
        self
    }

    pub fn windup_limit(mut self, v: f64) -> Self {
        self.config.windup_limit = v;
        self
    }

    pub fn output_limits(mut self, min: f64, max: f64) -> Self {
        self.config.min_output = min;
        self.config.max_output = max;
        self
    }

    pub fn rate_limit(mut self, v: f64) -> Self {
        self.config.rate_limit = Some(v);
        self
    }

    pub fn history_capacity(mut self, v: usize) -> Self {
        self.config.history_capacity = v;
        self
    }

    pub fn build(self) -> ControlResult<PidController> {
        PidController::new(self.config)
    }
}

impl Default for PidBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PID controller
// ---------------------------------------------------------------------------

/// PID stimulation controller.
///
/// `error = measurement - setpoint`: a biomarker above target produces
/// positive error and therefore more stimulation through the P term.
/// Integration is forward Euler; with anti-windup the accumulator is
/// clamped right after each addition, before it is used. The derivative
/// is a plain backward difference with `previous_error` starting at zero,
/// so the first step sees `kd * error / dt`.
#[derive(Debug, Clone)]
pub struct PidController {
    core: ControllerCore,
    gains: PidGains,
    anti_windup: bool,
    windup_limit: f64,
    rate_limit: Option<f64>,
    integral: f64,
    prev_error: f64,
    prev_control: f64,
}

impl PidController {
    pub fn new(config: PidConfig) -> ControlResult<Self> {
        config.validate()?;
        let core = ControllerCore::new(config.dt, config.limits(), config.history_capacity)?;
        Ok(Self {
            gains: config.gains(),
            anti_windup: config.anti_windup,
            windup_limit: config.windup_limit,
            rate_limit: config.rate_limit,
            integral: 0.0,
            prev_error: 0.0,
            prev_control: core.limits().min,
            core,
        })
    }

    pub fn builder() -> PidBuilder {
        PidBuilder::new()
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Replace all three gains at once. Accumulator and history are kept.
    pub fn set_gains(&mut self, gains: PidGains) -> ControlResult<()> {
        gains.validate()?;
        debug!(kp = gains.kp, ki = gains.ki, kd = gains.kd, "PID gains replaced");
        self.gains = gains;
        Ok(())
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn previous_error(&self) -> f64 {
        self.prev_error
    }

    pub fn previous_control(&self) -> f64 {
        self.prev_control
    }

    pub fn rate_limit(&self) -> Option<f64> {
        self.rate_limit
    }

    /// Ziegler-Nichols tuning from an ultimate gain `ku` and period `tu`.
    ///
    /// `method` is one of `classic`, `pessen`, `some_overshoot`,
    /// `no_overshoot`. On any error the current gains are left alone.
    pub fn tune_from_ultimate_gain(
        &mut self,
        ku: f64,
        tu: f64,
        method: &str,
    ) -> ControlResult<PidGains> {
        let method: ZieglerNichols = method.parse()?;
        self.tune_with(method, ku, tu)
    }

    pub fn tune_with(
        &mut self,
        method: ZieglerNichols,
        ku: f64,
        tu: f64,
    ) -> ControlResult<PidGains> {
        let gains = method.gains(ku, tu)?;
        self.set_gains(gains)?;
        info!(
            %method,
            kp = gains.kp,
            ki = gains.ki,
            kd = gains.kd,
            "PID tuned using Ziegler-Nichols"
        );
        Ok(gains)
    }

    /// Advisory diagnostics over the last 100 error samples.
    pub fn recommend_tuning(&self) -> TuningAdvice {
        let errors = self.core.history().recent_errors(DIAGNOSTIC_WINDOW);
        analyze_errors(&errors, self.core.dt())
    }

    /// Move buffered history out, e.g. into an external log.
    pub fn drain_history(&mut self) -> (Vec<f64>, Vec<f64>) {
        self.core.drain_history()
    }
}

impl Controller for PidController {
    fn compute_control(&mut self, measurement: f64, setpoint: f64) -> ControlResult<f64> {
        check_finite(measurement, setpoint)?;
        let error = measurement - setpoint;
        // finite operands can still overflow
        check_finite(error, setpoint)?;

        let dt = self.core.dt();

        let p_term = gain_term(self.gains.kp, error);

        let mut integral = self.integral + error * dt;
        if self.anti_windup {
            integral = integral.clamp(-self.windup_limit, self.windup_limit);
        }
        let i_term = gain_term(self.gains.ki, integral);

        let derivative = (error - self.prev_error) / dt;
        let d_term = gain_term(self.gains.kd, derivative);

        let raw = p_term + i_term + d_term;
        if !raw.is_finite() || !integral.is_finite() {
            return Err(ControlError::Overflow { measurement, setpoint });
        }

        let mut control = self.core.saturate(raw);
        if let Some(max_rate) = self.rate_limit {
            control = self.core.apply_rate_limit(control, self.prev_control, max_rate);
        }

        self.integral = integral;
        self.prev_error = error;
        self.prev_control = control;
        self.core.record_step(control, error);

        Ok(control)
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.prev_control = self.core.limits().min;
        self.core.reset();
        debug!("PID controller reset");
    }

    fn get_params(&self) -> ControllerParams {
        let mut params = self
            .core
            .base_params()
            .with("strategy", "pid")
            .with("kp", self.gains.kp)
            .with("ki", self.gains.ki)
            .with("kd", self.gains.kd)
            .with("anti_windup", self.anti_windup)
            .with("windup_limit", self.windup_limit)
            .with("rate_limited", self.rate_limit.is_some());
        if let Some(rate) = self.rate_limit {
            params.insert("rate_limit", rate);
        }
        params
    }

    fn core(&self) -> &ControllerCore {
        &self.core
    }

    fn name(&self) -> &str {
        "PidController"
    }
}

/// A zero gain switches its term off even when the signal is not finite.
fn gain_term(gain: f64, signal: f64) -> f64 {
    if gain == 0.0 {
        0.0
    } else {
        gain * signal
    }
}

impl fmt::Display for PidController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PidController(Kp={}, Ki={}, Kd={})",
            self.gains.kp, self.gains.ki, self.gains.kd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tuning::TuningAspect;

    fn reference() -> PidController {
        PidController::new(PidConfig::default()).unwrap()
    }

    #[test]
    fn first_step_saturates_high() {
        let mut pid = reference();
        let out = pid.compute_control(0.8, 0.3).unwrap();
        // p = 1.0, i = 0.00025, d = 50.0 -> raw 51.00025
        assert_eq!(out, 5.0, "raw output must clamp to the upper bound");
        assert!((pid.integral() - 0.0005).abs() < 1e-12);
        assert!((pid.previous_error() - 0.5).abs() < 1e-12);
        assert!((pid.elapsed_time() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn on_target_holds_zero() {
        let mut pid = reference();
        for step in 0..1000 {
            let out = pid.compute_control(0.3, 0.3).unwrap();
            assert_eq!(out, 0.0, "step {step} drifted off zero");
        }
        assert_eq!(pid.integral(), 0.0);
        let (c, e) = pid.get_history();
        assert_eq!(c.len(), 1000);
        assert_eq!(e.len(), 1000);
    }

    #[test]
    fn proportional_term_follows_sign_convention() {
        let mut pid = PidController::builder().kp(1.0).ki(0.0).kd(0.0).build().unwrap();
        let out = pid.compute_control(0.6, 0.4).unwrap();
        assert!((out - 0.2).abs() < 1e-12);
        // below target -> negative raw -> lower bound
        let out = pid.compute_control(0.2, 0.4).unwrap();
        assert_eq!(out, 0.0);
    }

    #[test]
    fn first_step_derivative_uses_zero_previous_error() {
        let mut pid = PidController::builder()
            .kp(0.0)
            .ki(0.0)
            .kd(0.001)
            .dt(0.01)
            .build()
            .unwrap();
        // kd * 0.5 / 0.01 = 0.05
        let out = pid.compute_control(0.9, 0.4).unwrap();
        assert!((out - 0.05).abs() < 1e-12);
    }

    #[test]
    fn anti_windup_bounds_integral() {
        let mut pid = PidController::builder()
            .dt(0.1)
            .windup_limit(1.0)
            .build()
            .unwrap();
        for _ in 0..500 {
            pid.compute_control(1.0, 0.0).unwrap();
            assert!(pid.integral().abs() <= 1.0);
        }
        assert_eq!(pid.integral(), 1.0);
        for _ in 0..500 {
            pid.compute_control(-5.0, 0.0).unwrap();
            assert!(pid.integral().abs() <= 1.0);
        }
        assert_eq!(pid.integral(), -1.0);
    }

    #[test]
    fn integral_unbounded_without_anti_windup() {
        let mut pid = PidController::builder()
            .dt(0.1)
            .anti_windup(false)
            .windup_limit(1.0)
            .build()
            .unwrap();
        for _ in 0..100 {
            pid.compute_control(1.0, 0.0).unwrap();
        }
        assert!((pid.integral() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_input_leaves_state_untouched() {
        let mut pid = reference();
        pid.compute_control(0.5, 0.3).unwrap();
        let integral = pid.integral();
        let time = pid.elapsed_time();

        let err = pid.compute_control(f64::NAN, 0.3).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(pid.compute_control(0.5, f64::INFINITY).is_err());
        assert!(pid.compute_control(f64::MAX, -f64::MAX).is_err(), "overflowing error");

        assert_eq!(pid.integral(), integral);
        assert_eq!(pid.elapsed_time(), time);
        assert_eq!(pid.get_history().0.len(), 1);
        // still usable
        assert!(pid.compute_control(0.5, 0.3).is_ok());
    }

    #[test]
    fn zero_gain_terms_ignore_overflowing_signal() {
        let mut pid = PidController::builder().kp(1.0).ki(0.0).kd(0.0).build().unwrap();
        // derivative of 1e306 over 1 ms is infinite, but kd is zero
        let out = pid.compute_control(1e306, 0.0).unwrap();
        assert_eq!(out, 5.0);
    }

    #[test]
    fn overflowing_term_rejected_before_mutation() {
        let mut pid = reference();
        pid.compute_control(0.5, 0.3).unwrap();
        let (integral, prev_error, prev_control) =
            (pid.integral(), pid.previous_error(), pid.previous_control());

        let err = pid.compute_control(1e306, 0.0).unwrap_err();
        assert!(matches!(err, ControlError::Overflow { .. }));
        assert!(err.is_invalid_input());

        assert_eq!(pid.integral(), integral);
        assert_eq!(pid.previous_error(), prev_error);
        assert_eq!(pid.previous_control(), prev_control);
        assert!((pid.elapsed_time() - 0.001).abs() < 1e-15);
        assert_eq!(pid.get_history().0.len(), 1);
    }

    #[test]
    fn drain_history_keeps_clock_and_integrator() {
        let mut pid = reference();
        for _ in 0..5 {
            pid.compute_control(0.4, 0.3).unwrap();
        }
        let integral = pid.integral();
        let time = pid.elapsed_time();

        let (controls, errors) = pid.drain_history();
        assert_eq!(controls.len(), 5);
        assert_eq!(errors.len(), 5);
        assert!(pid.get_history().0.is_empty());
        assert_eq!(pid.integral(), integral);
        assert_eq!(pid.elapsed_time(), time);

        pid.compute_control(0.4, 0.3).unwrap();
        let (controls, errors) = pid.get_history();
        assert_eq!(controls.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!((pid.elapsed_time() - 6.0 * 0.001).abs() < 1e-12);
    }

    #[test]
    fn reset_reproduces_fresh_sequence() {
        let inputs = [(0.8, 0.3), (0.6, 0.3), (0.35, 0.3), (0.1, 0.3), (0.4, 0.3)];
        let mut fresh = PidController::builder().kd(0.0001).build().unwrap();
        let expected: Vec<f64> = inputs
            .iter()
            .map(|&(m, s)| fresh.compute_control(m, s).unwrap())
            .collect();

        let mut used = PidController::builder().kd(0.0001).build().unwrap();
        for _ in 0..50 {
            used.compute_control(0.9, 0.1).unwrap();
        }
        used.reset();
        used.reset();
        let replay: Vec<f64> = inputs
            .iter()
            .map(|&(m, s)| used.compute_control(m, s).unwrap())
            .collect();

        assert_eq!(expected, replay);
        assert_eq!(used.previous_control(), fresh.previous_control());
    }

    #[test]
    fn rate_limit_bounds_slew() {
        let mut pid = PidController::builder().rate_limit(2.0).build().unwrap();
        let max_step = 2.0 * 0.001;
        let mut prev = 0.0;
        for _ in 0..200 {
            let out = pid.compute_control(0.8, 0.3).unwrap();
            assert!((out - prev).abs() <= max_step + 1e-12);
            assert!((0.0..=5.0).contains(&out));
            prev = out;
        }
        assert!((prev - 200.0 * max_step).abs() < 1e-9);
    }

    #[test]
    fn rate_limit_starts_from_envelope_floor() {
        let mut pid = PidController::builder()
            .output_limits(1.0, 5.0)
            .rate_limit(2.0)
            .build()
            .unwrap();
        assert_eq!(pid.previous_control(), 1.0);
        let first = pid.compute_control(0.8, 0.3).unwrap();
        assert!((first - 1.002).abs() < 1e-12, "first output {first}");

        pid.reset();
        assert_eq!(pid.previous_control(), 1.0);
        // below target: raw clamps to the floor and stays there
        let out = pid.compute_control(0.1, 0.3).unwrap();
        assert_eq!(out, 1.0);
    }

    #[test]
    fn rate_limit_disabled_by_default() {
        let pid = reference();
        assert_eq!(pid.rate_limit(), None);
        assert_eq!(pid.get_params().get_bool("rate_limited"), Some(false));
    }

    #[test]
    fn tune_classic_applies_all_gains() {
        let mut pid = reference();
        pid.compute_control(0.8, 0.3).unwrap();
        let integral = pid.integral();

        let g = pid.tune_from_ultimate_gain(4.0, 0.5, "classic").unwrap();
        assert_eq!(pid.gains(), g);
        assert!((g.kp - 2.4).abs() < 1e-12);
        assert!((g.ki - 9.6).abs() < 1e-12);
        assert!((g.kd - 0.15).abs() < 1e-12);
        // tuning is not a reset
        assert_eq!(pid.integral(), integral);
        assert_eq!(pid.get_history().0.len(), 1);
    }

    #[test]
    fn tune_unknown_method_keeps_gains() {
        let mut pid = reference();
        let before = pid.gains();
        let err = pid.tune_from_ultimate_gain(4.0, 0.5, "bogus").unwrap_err();
        assert!(matches!(err, ControlError::InvalidConfig(_)));
        assert_eq!(pid.gains(), before);
    }

    #[test]
    fn set_gains_rejects_non_finite() {
        let mut pid = reference();
        assert!(pid.set_gains(PidGains::new(f64::NAN, 0.0, 0.0)).is_err());
        assert_eq!(pid.gains(), PidGains::new(2.0, 0.5, 0.1));
    }

    #[test]
    fn recommend_tuning_needs_full_window() {
        let mut pid = reference();
        for _ in 0..99 {
            pid.compute_control(0.8, 0.3).unwrap();
        }
        assert!(matches!(pid.recommend_tuning(), TuningAdvice::InsufficientData { .. }));
        pid.compute_control(0.8, 0.3).unwrap();
        let advice = pid.recommend_tuning();
        assert!(advice.recommendation(TuningAspect::Integral).is_some());
    }

    #[test]
    fn params_snapshot_has_all_keys() {
        let pid = reference();
        let p = pid.get_params();
        for key in ["dt", "time", "kp", "ki", "kd", "anti_windup", "windup_limit"] {
            assert!(p.contains_key(key), "missing {key}");
        }
        assert_eq!(p.get_f64("kp"), Some(2.0));
        assert_eq!(p.get_f64("time"), Some(0.0));
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        assert!(PidController::builder().dt(0.0).build().is_err());
        assert!(PidController::builder().windup_limit(0.0).build().is_err());
        assert!(PidController::builder().output_limits(5.0, 0.0).build().is_err());
        assert!(PidController::builder().rate_limit(-1.0).build().is_err());
        assert!(PidController::builder().history_capacity(0).build().is_err());
    }

    #[test]
    fn display_lists_gains() {
        assert_eq!(reference().to_string(), "PidController(Kp=2, Ki=0.5, Kd=0.1)");
    }
}
