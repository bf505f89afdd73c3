use std::fmt::{self, Display};

use booster::{Dataset, Model, Params};
use serde::{Deserialize, Serialize};

/// The name of a partition held by some worker of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartKey(String);

impl PartKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The specification for a single local trainer task of a round.
///
/// The worker rebuilds its own topology from `addresses`, so every task of
/// the round ships the same address list in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSpec {
    /// The address of the worker that runs this task.
    pub worker: String,
    /// Every worker of the round, in round order.
    pub addresses: Vec<String>,
    pub base_port: u16,
    pub listen_time_out: u64,
    pub params: Params,
    /// The partitions concatenated into this worker's shard.
    pub parts: Vec<PartKey>,
    /// Whether this worker ships its model back.
    pub return_model: bool,
}

/// Which output a prediction task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictKind {
    Values,
    Probabilities,
}

/// The specification for predicting a single partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictSpec {
    pub model: Model,
    pub part: PartKey,
    pub kind: PredictKind,
}

/// A partition to be stored on a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSpec {
    pub key: PartKey,
    pub part: Dataset,
}
