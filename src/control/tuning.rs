//! Ziegler-Nichols gain formulas and closed-loop tuning diagnostics.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::controller::require_positive;
use super::pid::PidGains;
use crate::error::{ControlError, ControlResult};

/// Error samples inspected by [`analyze_errors`].
pub const DIAGNOSTIC_WINDOW: usize = 100;
/// Tail of the window averaged as steady-state error.
pub const STEADY_STATE_WINDOW: usize = 20;
/// |error| below this counts as "on target".
pub const ERROR_BAND: f64 = 0.1;
pub const MAX_SIGN_CHANGES: usize = 10;
/// Seconds.
pub const MAX_SETTLING_TIME: f64 = 5.0;

// ---------------------------------------------------------------------------
// Ziegler-Nichols rule sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZieglerNichols {
    Classic,
    Pessen,
    SomeOvershoot,
    NoOvershoot,
}

impl ZieglerNichols {
    pub const ALL: [ZieglerNichols; 4] = [
        Self::Classic,
        Self::Pessen,
        Self::SomeOvershoot,
        Self::NoOvershoot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Pessen => "pessen",
            Self::SomeOvershoot => "some_overshoot",
            Self::NoOvershoot => "no_overshoot",
        }
    }

    /// Gains from ultimate gain `ku` and ultimate period `tu` (s).
    pub fn gains(self, ku: f64, tu: f64) -> ControlResult<PidGains> {
        require_positive("ultimate gain ku", ku)?;
        require_positive("ultimate period tu", tu)?;

        let (kp, ki_ratio, kd) = match self {
            Self::Classic => {
                let kp = 0.6 * ku;
                (kp, 2.0, kp * tu / 8.0)
            }
            Self::Pessen => {
                let kp = 0.7 * ku;
                (kp, 2.5, 0.15 * kp * tu)
            }
            Self::SomeOvershoot => {
                let kp = 0.33 * ku;
                (kp, 2.0, kp * tu / 3.0)
            }
            Self::NoOvershoot => {
                let kp = 0.2 * ku;
                (kp, 2.0, kp * tu / 3.0)
            }
        };

        Ok(PidGains { kp, ki: ki_ratio * kp / tu, kd })
    }
}

impl fmt::Display for ZieglerNichols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZieglerNichols {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ControlError::config(format!("unknown tuning method: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Which part of the law a recommendation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TuningAspect {
    Integral,
    Derivative,
    Proportional,
    Speed,
}

impl TuningAspect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integral => "integral",
            Self::Derivative => "derivative",
            Self::Proportional => "proportional",
            Self::Speed => "speed",
        }
    }
}

/// Outcome of a diagnostic pass. Advisory only; nothing is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum TuningAdvice {
    InsufficientData { samples: usize, required: usize },
    Recommendations(BTreeMap<TuningAspect, &'static str>),
    LooksGood,
}

impl TuningAdvice {
    pub fn recommendation(&self, aspect: TuningAspect) -> Option<&'static str> {
        match self {
            Self::Recommendations(map) => map.get(&aspect).copied(),
            _ => None,
        }
    }
}

impl fmt::Display for TuningAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { samples, required } => write!(
                f,
                "Not enough data for recommendations ({samples}/{required} samples)"
            ),
            Self::LooksGood => f.write_str("Tuning looks good!"),
            Self::Recommendations(map) => {
                let mut first = true;
                for (aspect, text) in map {
                    if !first {
                        writeln!(f)?;
                    }
                    write!(f, "{}: {text}", aspect.as_str())?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Count sign changes between neighbours. Exact zero has its own sign, so
/// moving onto or off zero counts as a change.
pub fn sign_changes(errors: &[f64]) -> usize {
    errors
        .windows(2)
        .filter(|w| sign(w[0]) != sign(w[1]))
        .count()
}

/// Inspect the most recent [`DIAGNOSTIC_WINDOW`] errors sampled every `dt`.
pub fn analyze_errors(errors: &[f64], dt: f64) -> TuningAdvice {
    if errors.len() < DIAGNOSTIC_WINDOW {
        return TuningAdvice::InsufficientData {
            samples: errors.len(),
            required: DIAGNOSTIC_WINDOW,
        };
    }
    let window = &errors[errors.len() - DIAGNOSTIC_WINDOW..];
    let mut recs = BTreeMap::new();

    let tail = &window[DIAGNOSTIC_WINDOW - STEADY_STATE_WINDOW..];
    let steady_state = tail.iter().sum::<f64>() / tail.len() as f64;
    if steady_state.abs() > ERROR_BAND {
        recs.insert(TuningAspect::Integral, "Increase Ki to reduce steady-state error");
    }

    if sign_changes(window) > MAX_SIGN_CHANGES {
        recs.insert(TuningAspect::Derivative, "Increase Kd to reduce oscillations");
        recs.insert(TuningAspect::Proportional, "Consider reducing Kp");
    }

    if let Some(idx) = window.iter().position(|e| e.abs() < ERROR_BAND) {
        if idx as f64 * dt > MAX_SETTLING_TIME {
            recs.insert(TuningAspect::Speed, "Increase Kp for faster response");
        }
    }

    if recs.is_empty() {
        TuningAdvice::LooksGood
    } else {
        TuningAdvice::Recommendations(recs)
    }
}
