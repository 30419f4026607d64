//! TOML configuration for a closed-loop run.
//!
//! Every table is optional and falls back to the documented defaults:
//!
//! ```toml
//! [controller]
//! strategy = "pid"        # or "threshold"
//!
//! [pid]
//! kp = 2.0
//! ki = 0.5
//! kd = 0.1
//! dt = 0.001
//! anti_windup = true
//! windup_limit = 10.0
//! min_output = 0.0
//! max_output = 5.0
//! # rate_limit = 2.0     # mA/s, off when absent
//!
//! [run]
//! setpoint = 0.3
//! max_time = 2.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::{Controller, PidConfig, PidController, ThresholdConfig, ThresholdController};
use crate::error::ControlResult;
use crate::sim::{LoopConfig, PlantConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Pid,
    Threshold,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerSection {
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StimConfig {
    pub controller: ControllerSection,
    pub pid: PidConfig,
    pub threshold: ThresholdConfig,
    pub plant: PlantConfig,
    pub run: LoopConfig,
}

impl StimConfig {
    pub fn from_toml_str(s: &str) -> ControlResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ControlResult<Self> {
        debug!("loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validates the selected strategy's table plus plant and run tables.
    pub fn validate(&self) -> ControlResult<()> {
        match self.controller.strategy {
            Strategy::Pid => self.pid.validate()?,
            Strategy::Threshold => self.threshold.validate()?,
        }
        self.plant.validate()?;
        self.run.validate()
    }

    pub fn build_controller(&self) -> ControlResult<StrategyController> {
        Ok(match self.controller.strategy {
            Strategy::Pid => StrategyController::Pid(PidController::new(self.pid.clone())?),
            Strategy::Threshold => {
                StrategyController::Threshold(ThresholdController::new(self.threshold.clone())?)
            }
        })
    }
}

/// A controller built from configuration, keeping its concrete type so
/// strategy-specific operations (tuning, diagnostics) stay reachable.
#[derive(Debug, Clone)]
pub enum StrategyController {
    Pid(PidController),
    Threshold(ThresholdController),
}

impl StrategyController {
    pub fn as_controller(&self) -> &dyn Controller {
        match self {
            Self::Pid(c) => c,
            Self::Threshold(c) => c,
        }
    }

    pub fn as_controller_mut(&mut self) -> &mut dyn Controller {
        match self {
            Self::Pid(c) => c,
            Self::Threshold(c) => c,
        }
    }

    pub fn as_pid(&self) -> Option<&PidController> {
        match self {
            Self::Pid(c) => Some(c),
            Self::Threshold(_) => None,
        }
    }

    pub fn as_pid_mut(&mut self) -> Option<&mut PidController> {
        match self {
            Self::Pid(c) => Some(c),
            Self::Threshold(_) => None,
        }
    }
}
