use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::event::{EventDetector, LoopEvent};
use super::plant::Plant;
use crate::control::controller::{require_finite, require_positive};
use crate::control::Controller;
use crate::error::ControlResult;

// ---------------------------------------------------------------------------
// Loop configuration and trace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Target biomarker level.
    pub setpoint: f64,
    /// Run length, s.
    pub max_time: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            setpoint: 0.3,
            max_time: 2.0,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> ControlResult<()> {
        require_finite("setpoint", self.setpoint)?;
        require_positive("max_time", self.max_time)
    }
}

/// One controller call: the measurement it saw and the actuation applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoopSample {
    pub time: f64,
    pub measurement: f64,
    pub setpoint: f64,
    pub control: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LoopTrace {
    pub samples: Vec<LoopSample>,
    pub events: Vec<LoopEvent>,
    /// Steps where the controller rejected its input and the previous
    /// actuation was held.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Closed-loop driver
// ---------------------------------------------------------------------------

/// Drive `controller` against `plant` at the controller's `dt` until
/// `config.max_time`.
///
/// A step whose input the controller rejects as non-finite is skipped: the
/// previous actuation is held and the plant keeps running. Any other error
/// aborts the run.
pub fn simulate_with(
    controller: &mut dyn Controller,
    plant: &mut dyn Plant,
    config: &LoopConfig,
    detectors: &mut [Box<dyn EventDetector>],
) -> ControlResult<LoopTrace> {
    config.validate()?;

    let dt = controller.dt();
    let steps = (config.max_time / dt).round() as usize;
    let mut trace = LoopTrace {
        samples: Vec::with_capacity(steps.min(200_000)),
        ..Default::default()
    };

    debug!(
        controller = controller.name(),
        steps,
        dt,
        setpoint = config.setpoint,
        "starting closed loop"
    );

    let mut measurement = plant.measure();
    let mut actuation = controller.limits().min;
    let mut prev: Option<LoopSample> = None;

    for i in 0..steps {
        let time = (i + 1) as f64 * dt;

        match controller.compute_control(measurement, config.setpoint) {
            Ok(u) => actuation = u,
            Err(e) if e.is_invalid_input() => {
                trace.skipped += 1;
                warn!(time, error = %e, "skipping corrupted sample, holding previous actuation");
            }
            Err(e) => return Err(e),
        }

        let sample = LoopSample {
            time,
            measurement,
            setpoint: config.setpoint,
            control: actuation,
        };

        if let Some(p) = prev {
            for det in detectors.iter_mut() {
                if let Some(kind) = det.check(&p, &sample) {
                    trace.events.push(LoopEvent { time, kind, sample });
                }
            }
        }

        trace.samples.push(sample);
        prev = Some(sample);

        measurement = plant.step(actuation, dt);
    }

    Ok(trace)
}

/// Run without event detectors (convenience wrapper).
pub fn simulate(
    controller: &mut dyn Controller,
    plant: &mut dyn Plant,
    config: &LoopConfig,
) -> ControlResult<LoopTrace> {
    simulate_with(controller, plant, config, &mut [])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
