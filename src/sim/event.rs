use super::runner::LoopSample;

// ---------------------------------------------------------------------------
// Closed-loop events
// ---------------------------------------------------------------------------

/// Kinds of closed-loop events.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Actuation reached the upper bound of the envelope.
    Saturated,
    /// Actuation left the upper bound.
    Desaturated,
    /// Measurement entered the settling band around the setpoint.
    Settled,
    Custom(String),
}

/// A discrete event that occurred during a run.
#[derive(Debug, Clone)]
pub struct LoopEvent {
    pub time: f64,
    pub kind: EventKind,
    pub sample: LoopSample,
}

/// Trait for passive event detectors.
/// Implementations inspect consecutive samples and report events.
pub trait EventDetector {
    fn check(&mut self, prev: &LoopSample, current: &LoopSample) -> Option<EventKind>;
}

/// Detects transitions onto and off the actuation ceiling.
pub struct SaturationDetector {
    pub max_output: f64,
}

impl SaturationDetector {
    pub fn new(max_output: f64) -> Self {
        Self { max_output }
    }
}

impl EventDetector for SaturationDetector {
    fn check(&mut self, prev: &LoopSample, current: &LoopSample) -> Option<EventKind> {
        let was = prev.control >= self.max_output;
        let is = current.control >= self.max_output;
        match (was, is) {
            (false, true) => Some(EventKind::Saturated),
            (true, false) => Some(EventKind::Desaturated),
            _ => None,
        }
    }
}

/// Fires once when |measurement - setpoint| first drops inside `band`.
pub struct SettlingDetector {
    pub band: f64,
    fired: bool,
}

impl SettlingDetector {
    pub fn new(band: f64) -> Self {
        Self { band, fired: false }
    }
}

impl EventDetector for SettlingDetector {
    fn check(&mut self, _prev: &LoopSample, current: &LoopSample) -> Option<EventKind> {
        if self.fired {
            return None;
        }
        if (current.measurement - current.setpoint).abs() < self.band {
            self.fired = true;
            Some(EventKind::Settled)
        } else {
            None
        }
    }
}
