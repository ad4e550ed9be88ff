//! The coexistence engine: a deterministic virtual-time scheduler, the
//! shared wireless medium it drives, and the two contention state machines
//! (Wi-Fi DCF and NR-U LBT) that run on top of it.

pub mod medium;
pub mod nru_station;
pub mod resources;
pub mod scheduler;
pub mod simulate;
pub mod timings;
pub mod wifi_station;

pub use medium::{NruConfig, WiFiConfig};
pub use simulate::{NruMode, RunOutcome, SimulationInputs, simulate_coexistence};
