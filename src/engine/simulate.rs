//! Top-level orchestration: wires a population of Wi-Fi and NR-U stations
//! onto a fresh scheduler and medium, runs them to the configured virtual
//! duration, and reduces the medium's counters into one output row.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::csv_writer;
use crate::error::SimulationError;
use crate::stats;

use super::medium::{NruConfig, Technology, WiFiConfig, WirelessMedium};
use super::nru_station::{nru_station_task, nru_sync_slot_task};
use super::scheduler::Executor;
use super::wifi_station::wifi_station_task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NruMode {
    /// gNB fills the gap to the next sync-slot boundary with a reservation
    /// signal and transmits data as soon as it wins contention.
    Rs,
    /// gNB delays backoff so data transmission begins exactly at a sync-slot
    /// boundary; no reservation signal.
    Gap,
}

impl NruMode {
    pub fn parse(s: &str) -> Result<Self, SimulationError> {
        match s {
            "rs" => Ok(NruMode::Rs),
            "gap" => Ok(NruMode::Gap),
            other => Err(SimulationError::InvalidNruMode(other.to_string())),
        }
    }

    fn is_gap(self) -> bool {
        matches!(self, NruMode::Gap)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationInputs {
    pub n_wifi: u32,
    pub n_nru: u32,
    pub seed: u64,
    pub simulation_time_s: u64,
    pub wifi: WiFiConfig,
    pub nru: NruConfig,
    pub nru_mode: NruMode,
}

/// One output row plus the raw backoff-slot histogram a sweep driver would
/// want for its own plots; only the row fields are written to CSV.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub simulation_seed: u64,
    pub wifi_node_count: u32,
    pub nru_node_count: u32,
    pub wifi_channel_occupancy: f64,
    pub wifi_channel_efficiency: f64,
    pub wifi_collision_probability: f64,
    pub nru_channel_occupancy: f64,
    pub nru_channel_efficiency: f64,
    pub nru_collision_probability: f64,
    pub total_channel_occupancy: f64,
    pub total_network_efficiency: f64,
    pub jain_fairness_index: f64,
    pub joint_airtime_fairness: f64,
}

pub fn simulate_coexistence(
    inputs: &SimulationInputs,
    output_csv_path: &Path,
) -> Result<(RunOutcome, HashMap<u64, HashMap<u32, u64>>), SimulationError> {
    let mut executor = Executor::new();
    let handle = executor.handle();
    let medium = WirelessMedium::new(handle.clone());
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(inputs.seed)));

    let mut wifi_ids = Vec::with_capacity(inputs.n_wifi as usize);
    for _ in 0..inputs.n_wifi {
        let config = inputs.wifi;
        let medium = medium.clone();
        let rng = rng.clone();
        let n_wifi = inputs.n_wifi;
        let id = executor.spawn(move |id, handle| {
            wifi_station_task(id, handle, medium, config, n_wifi, rng)
        });
        wifi_ids.push(id);
    }

    let mut nru_ids = Vec::with_capacity(inputs.n_nru as usize);
    for _ in 0..inputs.n_nru {
        let next_boundary: Rc<Cell<u64>> = Rc::new(Cell::new(0));

        let nru_config = inputs.nru;
        let rng_sync = rng.clone();
        let boundary_for_sync = next_boundary.clone();
        executor.spawn(move |id, handle| {
            nru_sync_slot_task(id, handle, nru_config, boundary_for_sync, rng_sync)
        });

        let nru_config = inputs.nru;
        let medium_for_station = medium.clone();
        let rng_station = rng.clone();
        let gap_mode = inputs.nru_mode.is_gap();
        let n_wifi = inputs.n_wifi;
        let id = executor.spawn(move |id, handle| {
            nru_station_task(
                id,
                handle,
                medium_for_station,
                nru_config,
                gap_mode,
                next_boundary,
                n_wifi,
                rng_station,
            )
        });
        nru_ids.push(id);
    }

    let total_time_us = inputs.simulation_time_s * 1_000_000;
    executor.run_until(total_time_us);

    let stats_ref = medium.stats.borrow();
    let wifi_data = stats_ref.total_data_airtime_us(&wifi_ids);
    let wifi_control = stats_ref.total_control_airtime_us(&wifi_ids);
    let nru_data = stats_ref.total_data_airtime_us(&nru_ids);
    let nru_control = stats_ref.total_control_airtime_us(&nru_ids);

    let wifi_succeeded = *stats_ref.succeeded.get(&Technology::WiFi).unwrap_or(&0);
    let wifi_failed = *stats_ref.failed.get(&Technology::WiFi).unwrap_or(&0);
    let nru_succeeded = *stats_ref.succeeded.get(&Technology::Nru).unwrap_or(&0);
    let nru_failed = *stats_ref.failed.get(&Technology::Nru).unwrap_or(&0);
    let backoff_counts = stats_ref.backoff_counts.clone();
    drop(stats_ref);

    let wifi_occupancy = stats::channel_occupancy(wifi_data, wifi_control, total_time_us);
    let wifi_efficiency = stats::channel_efficiency(wifi_data, total_time_us);
    let wifi_collision = stats::collision_probability(wifi_failed, wifi_succeeded);

    let nru_occupancy = stats::channel_occupancy(nru_data, nru_control, total_time_us);
    let nru_efficiency = stats::channel_efficiency(nru_data, total_time_us);
    let nru_collision = stats::collision_probability(nru_failed, nru_succeeded);

    let total_occupancy = stats::channel_occupancy(
        wifi_data + nru_data,
        wifi_control + nru_control,
        total_time_us,
    );
    let total_efficiency = stats::channel_efficiency(wifi_data + nru_data, total_time_us);
    let jain = stats::jain_fairness(wifi_occupancy, nru_occupancy);
    let joint = stats::joint_airtime_fairness(wifi_occupancy, nru_occupancy);

    let outcome = RunOutcome {
        simulation_seed: inputs.seed,
        wifi_node_count: inputs.n_wifi,
        nru_node_count: inputs.n_nru,
        wifi_channel_occupancy: wifi_occupancy,
        wifi_channel_efficiency: wifi_efficiency,
        wifi_collision_probability: wifi_collision,
        nru_channel_occupancy: nru_occupancy,
        nru_channel_efficiency: nru_efficiency,
        nru_collision_probability: nru_collision,
        total_channel_occupancy: total_occupancy,
        total_network_efficiency: total_efficiency,
        jain_fairness_index: jain,
        joint_airtime_fairness: joint,
    };

    csv_writer::append_row(output_csv_path, &outcome)?;

    info!(
        "seed={} wifi={} nru={} wifi_occ={:.3} nru_occ={:.3} total_occ={:.3} jain={:.3}",
        outcome.simulation_seed,
        outcome.wifi_node_count,
        outcome.nru_node_count,
        outcome.wifi_channel_occupancy,
        outcome.nru_channel_occupancy,
        outcome.total_channel_occupancy,
        outcome.jain_fairness_index,
    );

    Ok((outcome, backoff_counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wifi_config() -> WiFiConfig {
        WiFiConfig {
            data_size_bytes: 1472,
            min_cw: 15,
            max_cw: 63,
            retry_limit: 7,
            mcs: 7,
        }
    }

    fn nru_config() -> NruConfig {
        NruConfig {
            prioritization_period_us: 16,
            observation_slot_us: 9,
            sync_slot_duration_us: 1000,
            min_sync_desync_us: 0,
            max_sync_desync_us: 1000,
            m_observation_slots: 3,
            min_cw: 15,
            max_cw: 63,
            mcot_ms: 6,
        }
    }

    // S1: a single, uncontended Wi-Fi station never collides and keeps the
    // channel busy almost all the time.
    #[test]
    fn s1_single_wifi_station_has_no_collisions_and_high_occupancy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.csv");
        let inputs = SimulationInputs {
            n_wifi: 1,
            n_nru: 0,
            seed: 42,
            simulation_time_s: 10,
            wifi: wifi_config(),
            nru: nru_config(),
            nru_mode: NruMode::Rs,
        };
        let (outcome, _) = simulate_coexistence(&inputs, &path).unwrap();
        assert_eq!(outcome.wifi_collision_probability, 0.0);
        assert!(outcome.wifi_channel_occupancy > 0.9);
        assert_eq!(outcome.nru_channel_occupancy, 0.0);
        assert_eq!(outcome.nru_collision_probability, 0.0);
    }

    // S2: five-and-five in rs mode, both technologies see moderate
    // contention and share the channel.
    #[test]
    fn s2_five_and_five_rs_mode_shares_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s2.csv");
        let inputs = SimulationInputs {
            n_wifi: 5,
            n_nru: 5,
            seed: 42,
            simulation_time_s: 10,
            wifi: wifi_config(),
            nru: nru_config(),
            nru_mode: NruMode::Rs,
        };
        let (outcome, _) = simulate_coexistence(&inputs, &path).unwrap();
        assert!(outcome.wifi_channel_occupancy > 0.0);
        assert!(outcome.nru_channel_occupancy > 0.0);
        assert!(outcome.total_channel_occupancy > 0.0 && outcome.total_channel_occupancy <= 1.0);
    }

    // S3/S4: synchronised desync (min==max) should let NR-U collide with
    // itself more than a spread-out desync window does.
    #[test]
    fn s3_vs_s4_desync_spread_raises_nru_occupancy_in_gap_mode() {
        let mut synchronised_nru = nru_config();
        synchronised_nru.min_sync_desync_us = 0;
        synchronised_nru.max_sync_desync_us = 0;

        let mut spread_nru = nru_config();
        spread_nru.min_sync_desync_us = 0;
        spread_nru.max_sync_desync_us = 1000;

        let dir = tempfile::tempdir().unwrap();
        let synced_inputs = SimulationInputs {
            n_wifi: 5,
            n_nru: 5,
            seed: 7,
            simulation_time_s: 10,
            wifi: wifi_config(),
            nru: synchronised_nru,
            nru_mode: NruMode::Gap,
        };
        let spread_inputs = SimulationInputs {
            nru: spread_nru,
            ..synced_inputs
        };

        let (synced, _) = simulate_coexistence(&synced_inputs, &dir.path().join("s3.csv")).unwrap();
        let (spread, _) = simulate_coexistence(&spread_inputs, &dir.path().join("s4.csv")).unwrap();

        assert!(spread.nru_channel_occupancy >= synced.nru_channel_occupancy);
    }

    // S6: determinism — identical inputs and seed must give byte-identical
    // numeric output.
    #[test]
    fn s6_identical_seed_and_inputs_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = SimulationInputs {
            n_wifi: 5,
            n_nru: 5,
            seed: 42,
            simulation_time_s: 5,
            wifi: wifi_config(),
            nru: nru_config(),
            nru_mode: NruMode::Rs,
        };
        let (a, _) = simulate_coexistence(&inputs, &dir.path().join("run_a.csv")).unwrap();
        let (b, _) = simulate_coexistence(&inputs, &dir.path().join("run_b.csv")).unwrap();

        assert_eq!(a.wifi_channel_occupancy, b.wifi_channel_occupancy);
        assert_eq!(a.nru_channel_occupancy, b.nru_channel_occupancy);
        assert_eq!(a.jain_fairness_index, b.jain_fairness_index);
    }

    #[test]
    fn n_nru_zero_leaves_all_nru_outputs_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = SimulationInputs {
            n_wifi: 3,
            n_nru: 0,
            seed: 1,
            simulation_time_s: 5,
            wifi: wifi_config(),
            nru: nru_config(),
            nru_mode: NruMode::Rs,
        };
        let (outcome, _) = simulate_coexistence(&inputs, &dir.path().join("isolated.csv")).unwrap();
        assert_eq!(outcome.nru_channel_occupancy, 0.0);
        assert_eq!(outcome.nru_channel_efficiency, 0.0);
        assert_eq!(outcome.nru_collision_probability, 0.0);
    }

    #[test]
    fn occupancy_and_efficiency_stay_within_unit_interval() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = SimulationInputs {
            n_wifi: 5,
            n_nru: 5,
            seed: 99,
            simulation_time_s: 10,
            wifi: wifi_config(),
            nru: nru_config(),
            nru_mode: NruMode::Gap,
        };
        let (outcome, _) = simulate_coexistence(&inputs, &dir.path().join("bounds.csv")).unwrap();
        for v in [
            outcome.wifi_channel_occupancy,
            outcome.nru_channel_occupancy,
            outcome.total_channel_occupancy,
            outcome.wifi_collision_probability,
            outcome.nru_collision_probability,
        ] {
            assert!((0.0..=1.0).contains(&v), "{v} out of range");
        }
        assert!(outcome.wifi_channel_efficiency <= outcome.wifi_channel_occupancy + 1e-9);
        assert!(outcome.nru_channel_efficiency <= outcome.nru_channel_occupancy + 1e-9);
    }

    #[test]
    fn invalid_nru_mode_is_rejected_before_the_engine_runs() {
        assert!(NruMode::parse("rs").is_ok());
        assert!(NruMode::parse("gap").is_ok());
        assert!(NruMode::parse("bogus").is_err());
    }
}
