//! # dbs-control
//!
//! Runs one closed-loop session: loads a TOML configuration (or defaults),
//! optionally auto-tunes the PID gains from an ultimate gain/period pair,
//! drives the controller against the linear reference plant and prints a
//! performance summary with tuning advice.

use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use dbs_control::config::StimConfig;
use dbs_control::sim::{
    self, EventDetector, LinearPlant, LoopSummary, SaturationDetector, SettlingDetector,
};

/// Closed-loop stimulation controller session
#[derive(Parser, Debug)]
#[command(name = "dbs-control")]
#[command(version)]
#[command(about = "Run a closed-loop stimulation controller against a reference plant")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when absent.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the run setpoint.
    #[arg(long)]
    setpoint: Option<f64>,

    /// Override the run length in seconds.
    #[arg(long, value_name = "SECONDS")]
    time: Option<f64>,

    /// Ultimate gain for Ziegler-Nichols tuning (requires --tu).
    #[arg(long, requires = "tu")]
    ku: Option<f64>,

    /// Ultimate period in seconds (requires --ku).
    #[arg(long, requires = "ku")]
    tu: Option<f64>,

    /// Ziegler-Nichols rule set: classic, pessen, some_overshoot, no_overshoot.
    #[arg(long, default_value = "classic")]
    method: String,

    /// Print the controller parameter snapshot as JSON and exit.
    #[arg(long)]
    params: bool,

    /// Print the run summary as JSON instead of the table.
    #[arg(long)]
    summary_json: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            StimConfig::load(path)?
        }
        None => StimConfig::default(),
    };
    if let Some(setpoint) = args.setpoint {
        config.run.setpoint = setpoint;
    }
    if let Some(time) = args.time {
        config.run.max_time = time;
    }
    config.validate()?;

    let mut strategy = config.build_controller()?;

    if let (Some(ku), Some(tu)) = (args.ku, args.tu) {
        let pid = strategy
            .as_pid_mut()
            .ok_or("auto-tuning requires the pid strategy")?;
        pid.tune_from_ultimate_gain(ku, tu, &args.method)?;
    }

    let controller = strategy.as_controller_mut();
    let stdout = std::io::stdout();

    if args.params {
        serde_json::to_writer_pretty(stdout.lock(), &controller.get_params())?;
        println!();
        return Ok(());
    }

    let mut plant = LinearPlant::from_config(&config.plant)?;
    let limits = controller.limits();
    let mut detectors: Vec<Box<dyn EventDetector>> = vec![
        Box::new(SaturationDetector::new(limits.max)),
        Box::new(SettlingDetector::new(0.02)),
    ];

    info!("Running {} for {:.2} s", controller.name(), config.run.max_time);
    let trace = sim::simulate_with(controller, &mut plant, &config.run, &mut detectors)?;
    let summary = LoopSummary::from_trace(&trace, limits.max).ok_or("run produced no samples")?;

    if args.summary_json {
        let params = controller.get_params();
        sim::write_summary(&mut stdout.lock(), controller.name(), &params, &summary)?;
        println!();
        return Ok(());
    }

    // -----------------------------------------------------------------------
    // Print results
    // -----------------------------------------------------------------------
    println!();
    println!("====================================================================");
    println!("  CLOSED-LOOP STIMULATION — {}", controller.name());
    println!("====================================================================");
    println!();
    println!("  Controller Parameters");
    println!("  ──────────────────────────────────────────────────────────────────");
    for (key, value) in controller.get_params().iter() {
        println!("  {key:<18} {value}");
    }
    println!();

    println!("  Loop Events");
    println!("  ──────────────────────────────────────────────────────────────────");
    if trace.events.is_empty() {
        println!("  (none)");
    }
    for ev in &trace.events {
        println!(
            "  {:<12} t={:>7.3}s   biomarker={:>6.3}   stim={:>5.2} mA",
            format!("{:?}", ev.kind),
            ev.time, ev.sample.measurement, ev.sample.control
        );
    }
    println!();

    println!("  Performance Summary");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  Biomarker:     {:>8.3} -> {:>8.3}   (setpoint {:.3})",
        summary.initial_measurement, summary.final_measurement, summary.setpoint
    );
    println!(
        "  Stimulation:   {:>8.3} mA mean   {:>8.3} mA peak",
        summary.mean_control_ma, summary.peak_control_ma
    );
    println!("  Saturated:     {:>8.1} %", summary.saturated_fraction * 100.0);
    match summary.settle_time_s {
        Some(t) => println!("  Settled at:    {t:>8.3} s"),
        None => println!("  Settled at:         n/a"),
    }
    if summary.skipped_samples > 0 {
        println!("  Skipped:       {:>8} samples", summary.skipped_samples);
    }
    println!();

    if let Some(pid) = strategy.as_pid() {
        println!("  Tuning Advice");
        println!("  ──────────────────────────────────────────────────────────────────");
        for line in pid.recommend_tuning().to_string().lines() {
            println!("  {line}");
        }
        println!();
    }

    println!("  Simulation: {} steps, dt={} s", summary.steps, strategy.as_controller().dt());
    println!("====================================================================");
    println!();

    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
