//! Typed configuration: the per round settings read out of the engine
//! parameters, and the JSON session file used by the demo binary.

use std::{fs, num::NonZeroUsize, path::Path};

use booster::{
    Params,
    network::{LISTEN_TIME_OUT, LOCAL_LISTEN_PORT},
};
use serde::{Deserialize, Serialize};

use crate::{CoordinatorErr, Result, WorkerAddress};

pub const DEFAULT_BASE_PORT: u16 = 12400;
pub const DEFAULT_LISTEN_TIME_OUT: u64 = 120;

/// The coordination settings of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundConfig {
    /// The ring port of the first worker, read from `local_listen_port`.
    pub base_port: u16,
    pub listen_time_out: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            listen_time_out: DEFAULT_LISTEN_TIME_OUT,
        }
    }
}

impl RoundConfig {
    /// Reads the round settings out of the caller's parameters.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::InvalidConfig` if a key has the wrong type or
    /// is out of range.
    pub fn from_params(params: &Params) -> Result<Self> {
        let invalid = |e: booster::EngineErr| CoordinatorErr::InvalidConfig(e.to_string());

        let base_port = match params.get_u64(LOCAL_LISTEN_PORT).map_err(invalid)? {
            Some(port) => u16::try_from(port).map_err(|_| {
                CoordinatorErr::InvalidConfig(format!("{LOCAL_LISTEN_PORT} {port} is not a port"))
            })?,
            None => DEFAULT_BASE_PORT,
        };

        let listen_time_out = params
            .get_u64(LISTEN_TIME_OUT)
            .map_err(invalid)?
            .unwrap_or(DEFAULT_LISTEN_TIME_OUT);

        if listen_time_out == 0 {
            return Err(CoordinatorErr::InvalidConfig(format!(
                "{LISTEN_TIME_OUT} must be at least one second"
            )));
        }

        Ok(Self {
            base_port,
            listen_time_out,
        })
    }
}

/// The synthetic dataset generated by the demo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub rows: usize,
    pub cols: usize,
    /// Rows per partition.
    pub chunk_rows: NonZeroUsize,
    pub seed: Option<u64>,
}

/// A whole demo session, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remote worker nodes, an in-process cluster is used when empty.
    #[serde(default)]
    pub workers: Vec<WorkerAddress>,
    /// The size of the in-process cluster.
    #[serde(default = "default_local_workers")]
    pub local_workers: NonZeroUsize,
    #[serde(default)]
    pub params: Params,
    pub dataset: DatasetConfig,
}

fn default_local_workers() -> NonZeroUsize {
    NonZeroUsize::MIN.saturating_add(2)
}

impl SessionConfig {
    /// Reads a `SessionConfig` from the JSON file at `path`.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::Io` if the file can't be read or
    /// `CoordinatorErr::InvalidConfig` if it isn't a valid session.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| CoordinatorErr::InvalidConfig(e.to_string()))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workers: Vec::new(),
            local_workers: default_local_workers(),
            params: Params::new().with("objective", "regression"),
            dataset: DatasetConfig {
                rows: 1000,
                cols: 4,
                chunk_rows: NonZeroUsize::MIN.saturating_add(249),
                seed: None,
            },
        }
    }
}
