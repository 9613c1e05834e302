//! Run a single-qubit RB sweep on a simulated device and print the decay of
//! the drive qubit's ground-state population.
//!
//! Usage: `simulate_rb [config.json]`. Set `RUST_LOG` for progress output.

use std::{ error::Error, path::PathBuf };
use rand::{ SeedableRng, rngs::StdRng };
use tracing::info;
use tracing_subscriber::EnvFilter;
use randbench::{
    clifford::CliffordGroup,
    config::ExperimentConfig,
    experiment::{ calibrate, run_rb },
    sequence::SequenceBank,
    sim::SimulatedDevice,
};

fn main() -> Result<(), Box<dyn Error>> {
    let filter =
        EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path: Option<PathBuf> = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ExperimentConfig::load(path.as_deref())?;
    info!(sweep = ?config.sweep, roles = ?config.roles, "loaded configuration");

    let group = CliffordGroup::global()?;
    let mut device = SimulatedDevice::new(config.device)?;
    // RNG for sequence generation only
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut bank = SequenceBank::new(config.sweep.interleave_gate()?);

    let calibration =
        calibrate(&mut device, &config.roles, config.sweep.calib_reps)?;
    let record =
        run_rb(
            &mut device,
            &config.sweep,
            &config.roles,
            group,
            &mut bank,
            &mut rng,
        )?;
    let analysis =
        record.analyze(&calibration, config.analysis.fix_negatives)?;

    let w_d: usize =
        analysis.depths().iter().max()
        .map(|d| (*d as f64).log10().floor() as usize + 1)
        .unwrap_or(1)
        .max(5);
    println!(
        "{:>w_d$}  {:>8}  {:>8}  {:>8}  {:>8}",
        "depth", "mean_g", "median_g", "std_g", "mean_f",
    );
    for s in analysis.summary().iter() {
        println!(
            "{:>w_d$}  {:8.5}  {:8.5}  {:8.5}  {:8.5}",
            s.depth, s.mean_g, s.median_g, s.std_g, s.mean_f,
        );
    }
    Ok(())
}
