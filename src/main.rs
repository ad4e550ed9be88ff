//! Single-run entry point: loads one [`coexistence_sim::config::RunConfig`]
//! from the TOML file path given as the sole command-line argument, runs
//! `simulate_coexistence` once, and exits non-zero with a logged error on
//! failure. Parameter sweeps, plotting, and contention-window search are
//! external drivers that call into this crate repeatedly — this binary runs
//! exactly one configuration, exactly once.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use env_logger::Builder;
use log::{LevelFilter, error, info};

use coexistence_sim::config::RunConfig;
use coexistence_sim::engine::{NruMode, SimulationInputs, simulate_coexistence};

fn init_logger() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("coexistence_sim"), LevelFilter::Debug)
        .init();
}

fn run(config_path: PathBuf) -> anyhow::Result<()> {
    let config = RunConfig::load(&config_path)
        .with_context(|| format!("loading run configuration from {}", config_path.display()))?;

    let nru_mode = NruMode::parse(&config.nru_mode)?;

    let inputs = SimulationInputs {
        n_wifi: config.n_wifi,
        n_nru: config.n_nru,
        seed: config.seed,
        simulation_time_s: config.simulation_time_s,
        wifi: config.wifi.into(),
        nru: config.nru.into(),
        nru_mode,
    };

    info!(
        "starting run: seed={} wifi={} nru={} duration={}s mode={}",
        inputs.seed, inputs.n_wifi, inputs.n_nru, inputs.simulation_time_s, config.nru_mode
    );

    let (outcome, _backoff_counts) = simulate_coexistence(&inputs, &config.output_csv_path)
        .with_context(|| format!("running simulation, writing to {}", config.output_csv_path.display()))?;

    println!(
        "seed={} wifi_nodes={} nru_nodes={} wifi_occupancy={:.4} nru_occupancy={:.4} \
         total_occupancy={:.4} jain_fairness={:.4} joint_fairness={:.4}",
        outcome.simulation_seed,
        outcome.wifi_node_count,
        outcome.nru_node_count,
        outcome.wifi_channel_occupancy,
        outcome.nru_channel_occupancy,
        outcome.total_channel_occupancy,
        outcome.jain_fairness_index,
        outcome.joint_airtime_fairness,
    );

    Ok(())
}

fn main() -> ExitCode {
    init_logger();

    let Some(config_path) = std::env::args().nth(1) else {
        error!("usage: coexistence-sim <config.toml>");
        return ExitCode::FAILURE;
    };

    match run(PathBuf::from(config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("run failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
