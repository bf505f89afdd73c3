//! The seam between the coordinator and the runtime that owns the workers.

mod local;
mod remote;

use async_trait::async_trait;
use booster::{Dataset, Predictions};
use comms::specs::{PredictSpec, TaskFailure, TrainSpec, TrainingResult};

use crate::{DistributedDataset, Placement, Result, WorkerAddress};

pub use local::LocalCluster;
pub use remote::RemoteCluster;

/// A worker as seen by the cluster runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub address: WorkerAddress,
    pub ncores: usize,
}

/// The cluster runtime the rounds run on.
///
/// Task submissions never fail as a whole, a worker that can't be reached or
/// whose task panics is reported as a `TaskFailure` for that worker.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Every worker of the cluster, in a stable order.
    async fn workers(&self) -> Result<Vec<WorkerInfo>>;

    /// Spreads `parts` over the workers.
    ///
    /// # Returns
    /// The distributed dataset, its placements in the order of `parts`.
    async fn scatter(&self, parts: Vec<Dataset>) -> Result<DistributedDataset>;

    /// Checks that every partition of `data` is materialized on its worker.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::WorkerTaskFailure` naming the first partition
    /// that isn't.
    async fn who_has(&self, data: &DistributedDataset) -> Result<Vec<Placement>>;

    /// Drops the partitions of `data` from their workers. Partitions already
    /// gone are skipped.
    ///
    /// # Errors
    /// Returns an error if a worker can't be told to release them.
    async fn release(&self, data: &DistributedDataset) -> Result<()>;

    /// Runs a local trainer task on `worker`.
    async fn submit_train(&self, worker: &WorkerAddress, spec: TrainSpec) -> TrainingResult;

    /// Predicts a single partition on `worker`.
    async fn submit_predict(
        &self,
        worker: &WorkerAddress,
        spec: PredictSpec,
    ) -> std::result::Result<Predictions, TaskFailure>;
}
