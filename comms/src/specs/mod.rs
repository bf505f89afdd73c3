//! Wire-level specifications exchanged between the coordinator and its workers.

mod outcome;
mod task;

pub use outcome::{FailureKind, TaskFailure, TrainingResult};
pub use task::{PartKey, PredictKind, PredictSpec, ScatterSpec, TrainSpec};
