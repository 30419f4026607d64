pub mod controller;
pub mod history;
pub mod params;
pub mod pid;
pub mod threshold;
pub mod tuning;

pub use controller::{
    apply_saturation, check_finite, rate_limit, ActuationLimits, Controller, ControllerCore,
};
pub use history::{ControlHistory, DEFAULT_HISTORY_CAPACITY};
pub use params::{ControllerParams, ParamValue};
pub use pid::{PidBuilder, PidConfig, PidController, PidGains};
pub use threshold::{ThresholdConfig, ThresholdController};
pub use tuning::{TuningAdvice, TuningAspect, ZieglerNichols};
