use std::{
    error::Error,
    fmt::{self, Display},
};

use booster::Model;
use serde::{Deserialize, Serialize};

/// The outcome of a local trainer task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingResult {
    /// The trained model, only ever sent by the master worker.
    Trained(Model),
    /// The task succeeded but has no model to ship.
    NoModel,
    Failed(TaskFailure),
}

/// What went wrong inside a worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The worker isn't part of the round's address list.
    AddressNotFound,
    /// Not every peer joined the ring within `listen_time_out`.
    HandshakeTimeout,
    /// The topology couldn't be rebuilt on the worker.
    Topology,
    /// The engine rejected the parameters, the data or the model.
    Engine,
    /// A partition is missing or failed to materialize.
    Partition,
    /// The worker couldn't be reached or answered out of protocol.
    Transport,
}

/// A failure captured inside a worker task, tagged with the worker's address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub worker: String,
    pub kind: FailureKind,
    pub msg: String,
}

impl TaskFailure {
    pub fn new(worker: impl Into<String>, kind: FailureKind, msg: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            kind,
            msg: msg.into(),
        }
    }
}

impl Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {} failed ({:?}): {}", self.worker, self.kind, self.msg)
    }
}

impl Error for TaskFailure {}
