use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use booster::{Dataset, Engine, Predictions};
use comms::specs::{FailureKind, PartKey, PredictSpec, TaskFailure, TrainSpec, TrainingResult};
use log::{debug, info};
use tokio::task;

use super::{Cluster, WorkerInfo};
use crate::{
    CoordinatorErr, DistributedDataset, PartitionStore, Placement, Result, WorkerAddress,
    task::{run_predict, run_train},
};

struct LocalWorker {
    info: WorkerInfo,
    store: Arc<PartitionStore>,
}

/// An in-process cluster, every worker is a partition store plus the
/// blocking thread pool of the runtime.
pub struct LocalCluster {
    engine: Arc<dyn Engine>,
    workers: Vec<LocalWorker>,
    next_key: AtomicUsize,
}

impl LocalCluster {
    /// Creates a new `LocalCluster`.
    ///
    /// # Arguments
    /// * `engine` - The engine every worker trains with.
    /// * `addresses` - The addresses the workers are known by.
    /// * `ncores` - The cores reported for every worker.
    pub fn new(engine: Arc<dyn Engine>, addresses: Vec<WorkerAddress>, ncores: usize) -> Self {
        let workers = addresses
            .into_iter()
            .map(|address| LocalWorker {
                info: WorkerInfo { address, ncores },
                store: Arc::new(PartitionStore::new()),
            })
            .collect();

        Self {
            engine,
            workers,
            next_key: AtomicUsize::new(0),
        }
    }

    /// Creates a cluster of `n` single core workers on the loopback interface,
    /// addressed `tcp://127.0.0.1:{first_port + i}`.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::Topology` if the addresses run out of ports.
    pub fn with_workers(engine: Arc<dyn Engine>, n: usize, first_port: u16) -> Result<Self> {
        let addresses = (0..n)
            .map(|i| WorkerAddress::parse(&format!("tcp://127.0.0.1:{}", first_port as usize + i)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::new(engine, addresses, 1))
    }

    /// Stores `part` on `worker` under a fresh key.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::InvalidConfig` if `worker` isn't part of the cluster.
    pub fn place(&self, worker: &WorkerAddress, part: Dataset) -> Result<Placement> {
        let holder = self.worker(worker).ok_or_else(|| {
            CoordinatorErr::InvalidConfig(format!("{worker} is not part of the cluster"))
        })?;

        let key = self.fresh_key();
        let rows = part.rows();
        holder.store.insert(key.clone(), part);

        Ok(Placement {
            key,
            worker: worker.clone(),
            rows,
        })
    }

    /// Marks the partition `key` as failed on whichever worker holds it.
    ///
    /// # Returns
    /// Whether any worker held it.
    pub fn poison(&self, key: &PartKey, msg: &str) -> bool {
        match self.workers.iter().find(|w| w.store.get(key).is_ok()) {
            Some(holder) => {
                holder.store.poison(key.clone(), msg);
                info!(worker = holder.info.address.as_str(); "poisoned partition {key}");
                true
            }
            None => false,
        }
    }

    /// The partition store of `worker`.
    pub fn store(&self, worker: &WorkerAddress) -> Option<&PartitionStore> {
        self.worker(worker).map(|w| w.store.as_ref())
    }

    fn worker(&self, address: &WorkerAddress) -> Option<&LocalWorker> {
        self.workers.iter().find(|w| &w.info.address == address)
    }

    fn fresh_key(&self) -> PartKey {
        let id = self.next_key.fetch_add(1, Ordering::Relaxed);
        PartKey::new(format!("part-{id}"))
    }

    fn unknown_worker(worker: &WorkerAddress) -> TaskFailure {
        TaskFailure::new(
            worker.as_str(),
            FailureKind::Transport,
            "the worker is not part of the cluster",
        )
    }
}

#[async_trait]
impl Cluster for LocalCluster {
    async fn workers(&self) -> Result<Vec<WorkerInfo>> {
        Ok(self.workers.iter().map(|w| w.info.clone()).collect())
    }

    async fn scatter(&self, parts: Vec<Dataset>) -> Result<DistributedDataset> {
        if self.workers.is_empty() {
            return Err(CoordinatorErr::NoWorkers);
        }

        let placements = parts
            .into_iter()
            .enumerate()
            .map(|(i, part)| {
                let worker = &self.workers[i % self.workers.len()].info.address;
                self.place(worker, part)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(parts = placements.len(); "scattered");
        Ok(DistributedDataset::new(placements))
    }

    async fn who_has(&self, data: &DistributedDataset) -> Result<Vec<Placement>> {
        for placement in data.placements() {
            let holder = self.worker(&placement.worker).ok_or_else(|| {
                CoordinatorErr::WorkerTaskFailure {
                    worker: placement.worker.to_string(),
                    msg: "the worker is not part of the cluster".into(),
                }
            })?;

            if let Err(e) = holder.store.get(&placement.key) {
                return Err(CoordinatorErr::WorkerTaskFailure {
                    worker: placement.worker.to_string(),
                    msg: e.to_string(),
                });
            }
        }

        Ok(data.placements().to_vec())
    }

    async fn release(&self, data: &DistributedDataset) -> Result<()> {
        for (worker, keys) in data.keys_per_worker() {
            if let Some(holder) = self.worker(worker) {
                let count = holder.store.release(&keys);
                debug!(worker = worker.as_str(), count = count; "released partitions");
            }
        }

        Ok(())
    }

    async fn submit_train(&self, worker: &WorkerAddress, spec: TrainSpec) -> TrainingResult {
        let Some(holder) = self.worker(worker) else {
            return TrainingResult::Failed(Self::unknown_worker(worker));
        };

        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&holder.store);

        task::spawn_blocking(move || run_train(engine.as_ref(), &store, &spec))
            .await
            .unwrap_or_else(|e| {
                TrainingResult::Failed(TaskFailure::new(
                    worker.as_str(),
                    FailureKind::Engine,
                    format!("the trainer task died: {e}"),
                ))
            })
    }

    async fn submit_predict(
        &self,
        worker: &WorkerAddress,
        spec: PredictSpec,
    ) -> std::result::Result<Predictions, TaskFailure> {
        let Some(holder) = self.worker(worker) else {
            return Err(Self::unknown_worker(worker));
        };

        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&holder.store);
        let name = worker.to_string();

        task::spawn_blocking(move || run_predict(engine.as_ref(), &store, &name, &spec))
            .await
            .unwrap_or_else(|e| {
                Err(TaskFailure::new(
                    worker.as_str(),
                    FailureKind::Engine,
                    format!("the prediction task died: {e}"),
                ))
            })
    }
}
