//! Single-run configuration loading. Follows the same
//! read-to-string-then-`toml::from_str` pattern used elsewhere in this
//! codebase for configuration, refined to return the typed
//! [`SimulationError`] taxonomy instead of a bare `String`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engine::medium::{NruConfig, WiFiConfig};
use crate::error::SimulationError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WiFiConfigToml {
    pub data_size_bytes: u64,
    pub min_cw: u32,
    pub max_cw: u32,
    pub retry_limit: u32,
    pub mcs: u8,
}

impl From<WiFiConfigToml> for WiFiConfig {
    fn from(c: WiFiConfigToml) -> Self {
        WiFiConfig {
            data_size_bytes: c.data_size_bytes,
            min_cw: c.min_cw,
            max_cw: c.max_cw,
            retry_limit: c.retry_limit,
            mcs: c.mcs,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NruConfigToml {
    #[serde(default = "default_prioritization_period_us")]
    pub prioritization_period_us: u64,
    #[serde(default = "default_observation_slot_us")]
    pub observation_slot_us: u64,
    #[serde(default = "default_sync_slot_duration_us")]
    pub sync_slot_duration_us: u64,
    pub min_sync_desync_us: u64,
    pub max_sync_desync_us: u64,
    #[serde(default = "default_m_observation_slots")]
    pub m_observation_slots: u32,
    pub min_cw: u32,
    pub max_cw: u32,
    #[serde(default = "default_mcot_ms")]
    pub mcot_ms: u64,
}

fn default_prioritization_period_us() -> u64 {
    16
}
fn default_observation_slot_us() -> u64 {
    9
}
fn default_sync_slot_duration_us() -> u64 {
    1000
}
fn default_m_observation_slots() -> u32 {
    3
}
fn default_mcot_ms() -> u64 {
    6
}

impl From<NruConfigToml> for NruConfig {
    fn from(c: NruConfigToml) -> Self {
        NruConfig {
            prioritization_period_us: c.prioritization_period_us,
            observation_slot_us: c.observation_slot_us,
            sync_slot_duration_us: c.sync_slot_duration_us,
            min_sync_desync_us: c.min_sync_desync_us,
            max_sync_desync_us: c.max_sync_desync_us,
            m_observation_slots: c.m_observation_slots,
            min_cw: c.min_cw,
            max_cw: c.max_cw,
            mcot_ms: c.mcot_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    pub n_wifi: u32,
    pub n_nru: u32,
    pub seed: u64,
    pub simulation_time_s: u64,
    pub nru_mode: String,
    pub output_csv_path: PathBuf,
    pub wifi: WiFiConfigToml,
    pub nru: NruConfigToml,
}

impl RunConfig {
    pub fn load(config_path: &Path) -> Result<Self, SimulationError> {
        let raw = fs::read_to_string(config_path).map_err(|source| SimulationError::ConfigRead {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| SimulationError::ConfigParse {
            path: config_path.to_path_buf(),
            source,
        })
    }
}
