use std::time::Instant;

use log::info;
use retina_sim::{ProtocolVariant, SimulationConfig, SimulationRunner};

fn main() -> anyhow::Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Treat-and-extend run with the default clinical parameter set
    let mut config = SimulationConfig::default();
    config.population.n_patients = 2000;

    info!(
        "Starting treat-and-extend simulation: {} patients, {}-day horizon",
        config.population.n_patients, config.population.horizon_days
    );
    let start = Instant::now();
    let output = SimulationRunner::new(config.clone())?.run()?;
    info!("Treat-and-extend finished in {:?}", start.elapsed());
    println!("{}", output.stats.summary());

    // Same population under fixed-interval dosing for comparison
    config.protocol.variant = ProtocolVariant::FixedInterval;
    config.protocol.assessment_interval_days = Some(182);

    info!("Starting fixed-interval comparison run");
    let start = Instant::now();
    let output = SimulationRunner::new(config)?.run()?;
    info!("Fixed-interval finished in {:?}", start.elapsed());
    println!("{}", output.stats.summary());

    Ok(())
}
