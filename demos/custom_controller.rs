use dbs_control::control::{check_finite, Controller, ControllerCore, ControllerParams};
use dbs_control::sim::{self, LinearPlant, LoopConfig, PlantConfig};
use dbs_control::ControlResult;

/// A proportional-only controller with a fixed bias, written against the
/// public contract to show that the loop driver needs nothing else.
struct BiasedProportional {
    core: ControllerCore,
    gain: f64,
    bias: f64,
}

impl Controller for BiasedProportional {
    fn compute_control(&mut self, measurement: f64, setpoint: f64) -> ControlResult<f64> {
        check_finite(measurement, setpoint)?;
        let error = measurement - setpoint;
        let control = self.core.saturate(self.bias + self.gain * error);
        self.core.record_step(control, error);
        Ok(control)
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn get_params(&self) -> ControllerParams {
        self.core
            .base_params()
            .with("gain", self.gain)
            .with("bias", self.bias)
    }

    fn core(&self) -> &ControllerCore {
        &self.core
    }

    fn name(&self) -> &str {
        "BiasedProportional"
    }
}

fn main() -> ControlResult<()> {
    let mut controller = BiasedProportional {
        core: ControllerCore::with_dt(0.001)?,
        gain: 8.0,
        bias: 1.5,
    };
    let mut plant = LinearPlant::from_config(&PlantConfig::default())?;
    let config = LoopConfig { setpoint: 0.5, max_time: 3.0 };

    println!("Simulating with {} controller...", controller.name());
    let trace = sim::simulate(&mut controller, &mut plant, &config)?;

    let last = trace.samples.last().map(|s| s.measurement).unwrap_or(f64::NAN);
    let peak = trace.samples.iter().map(|s| s.control).fold(0.0_f64, f64::max);
    let (controls, _) = controller.get_history();

    println!("Final biomarker: {:.3} (setpoint {:.3})", last, config.setpoint);
    println!("Peak stimulation: {:.2} mA", peak);
    println!("Steps logged: {}", controls.len());
    Ok(())
}
