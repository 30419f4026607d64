use std::io::Write;

use serde::Serialize;

use super::event::EventKind;
use super::runner::LoopTrace;
use crate::control::ControllerParams;

/// Summary statistics computed from a closed-loop trace.
#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub steps: usize,
    pub duration_s: f64,
    pub setpoint: f64,
    pub initial_measurement: f64,
    pub final_measurement: f64,
    pub final_error: f64,
    pub mean_control_ma: f64,
    pub peak_control_ma: f64,
    /// Share of steps spent at `max_output`.
    pub saturated_fraction: f64,
    pub skipped_samples: usize,
    pub settle_time_s: Option<f64>,
}

impl LoopSummary {
    /// Compute summary from trace data. `None` for an empty trace.
    pub fn from_trace(trace: &LoopTrace, max_output: f64) -> Option<Self> {
        let first = trace.samples.first()?;
        let last = trace.samples.last()?;
        let n = trace.samples.len();

        let mean_control = trace.samples.iter().map(|s| s.control).sum::<f64>() / n as f64;
        let peak_control = trace
            .samples
            .iter()
            .map(|s| s.control)
            .fold(f64::NEG_INFINITY, f64::max);
        let saturated = trace.samples.iter().filter(|s| s.control >= max_output).count();
        let settle_time = trace
            .events
            .iter()
            .find(|e| e.kind == EventKind::Settled)
            .map(|e| e.time);

        Some(Self {
            steps: n,
            duration_s: last.time,
            setpoint: last.setpoint,
            initial_measurement: first.measurement,
            final_measurement: last.measurement,
            final_error: last.measurement - last.setpoint,
            mean_control_ma: mean_control,
            peak_control_ma: peak_control,
            saturated_fraction: saturated as f64 / n as f64,
            skipped_samples: trace.skipped,
            settle_time_s: settle_time,
        })
    }
}

#[derive(Serialize)]
struct Report<'a> {
    controller: &'a str,
    params: &'a ControllerParams,
    performance: &'a LoopSummary,
}

/// Write controller parameters and run summary as pretty JSON.
pub fn write_summary<W: Write>(
    writer: &mut W,
    controller: &str,
    params: &ControllerParams,
    summary: &LoopSummary,
) -> serde_json::Result<()> {
    let report = Report { controller, params, performance: summary };
    serde_json::to_writer_pretty(&mut *writer, &report)
}
