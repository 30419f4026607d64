use thiserror::Error;

/// Errors surfaced by controllers, tuning and configuration loading.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Measurement or setpoint was NaN or infinite. No state was touched.
    #[error("non-finite input: measurement={measurement}, setpoint={setpoint}")]
    NonFiniteInput { measurement: f64, setpoint: f64 },

    /// Finite inputs drove an intermediate term of the control law out of
    /// range. No state was touched.
    #[error("control law overflow: measurement={measurement}, setpoint={setpoint}")]
    Overflow { measurement: f64, setpoint: f64 },

    /// Rejected configuration or tuning request.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ControlError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for per-sample input faults the driver may skip over.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::NonFiniteInput { .. } | Self::Overflow { .. })
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
