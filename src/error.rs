//! Typed error taxonomy. Only the handful of genuinely engine-rejectable
//! conditions from the design notes live here — an invalid NR-U mode string,
//! or an unreadable/unwritable path. Collisions, retries, and the NR-U
//! retransmission cap are ordinary control flow inside the engine and never
//! surface as a `Result::Err`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid nru_mode {0:?}: expected \"rs\" or \"gap\"")]
    InvalidNruMode(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to open output CSV {path}: {source}")]
    CsvOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output CSV {path}: {source}")]
    CsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
