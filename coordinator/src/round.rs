//! A single distributed training round.
//!
//! ```text
//! Idle -> TopologyBuilt -> Dispatched -> Reducing -> Done
//!   \            \                           \
//!    +------------+---------------------------+--> Failed
//! ```
//!
//! Every topology is built before a single task is dispatched, so invalid
//! rounds fail without touching the workers. Once dispatched, every task of
//! the round runs to completion before the outcomes are reduced.

use std::{collections::HashMap, sync::Arc};

use booster::{Engine, Model, Params};
use comms::specs::{TrainSpec, TrainingResult};
use futures::future::join_all;
use log::{info, warn};
use parking_lot::Mutex;

use crate::{
    Cluster, CoordinatorErr, DistributedDataset, Result, RoundConfig, TrainedModel, WorkerShards,
    build_topology,
};

const TREE_LEARNER: &str = "tree_learner";
const TREE_LEARNERS: [&str; 3] = ["data", "feature", "voting"];
const NUM_THREADS: &str = "num_threads";

/// The phases of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    TopologyBuilt,
    Dispatched,
    Reducing,
    Done,
    Failed,
}

/// Runs training rounds on a cluster.
pub struct RoundCoordinator<C: Cluster + ?Sized> {
    cluster: Arc<C>,
    engine: Arc<dyn Engine>,
    state: Mutex<RoundState>,
}

impl<C: Cluster + ?Sized> RoundCoordinator<C> {
    /// Creates a new `RoundCoordinator`.
    ///
    /// # Arguments
    /// * `cluster` - The cluster the rounds run on.
    /// * `engine` - The engine the workers train with, used for local prediction.
    pub fn new(cluster: Arc<C>, engine: Arc<dyn Engine>) -> Self {
        Self {
            cluster,
            engine,
            state: Mutex::new(RoundState::Idle),
        }
    }

    /// The state the latest round reached.
    pub fn state(&self) -> RoundState {
        *self.state.lock()
    }

    /// Trains on a dataset already scattered over the cluster.
    ///
    /// Every partition must be materialized on its worker, otherwise the call
    /// fails before any round starts.
    ///
    /// # Errors
    /// See `RoundCoordinator::train`.
    pub async fn fit(&self, data: &DistributedDataset, params: &Params) -> Result<TrainedModel> {
        self.transition(RoundState::Idle);

        let placements = match self.cluster.who_has(data).await {
            Ok(placements) => placements,
            Err(e) => {
                self.transition(RoundState::Failed);
                return Err(e);
            }
        };

        let shards = WorkerShards::from_placements(&placements);
        self.train(&shards, params).await
    }

    /// Runs one round: one local trainer task per shard, all of them in flight
    /// at once, reduced to the master worker's model.
    ///
    /// There are no retries, calling this again with another `local_listen_port`
    /// starts a fresh round.
    ///
    /// # Arguments
    /// * `shards` - One shard per worker, in round order.
    /// * `params` - The engine parameters, `local_listen_port` is the ring's base port.
    ///
    /// # Errors
    /// * `CoordinatorErr::NoWorkers` if `shards` is empty.
    /// * Any topology or config error, raised before dispatching.
    /// * `CoordinatorErr::InvalidConfig` if a shard lives outside the cluster.
    /// * The first failure of any task, if one failed.
    /// * `CoordinatorErr::InconsistentResult` if the round didn't produce exactly
    ///   one model.
    pub async fn train(&self, shards: &WorkerShards, params: &Params) -> Result<TrainedModel> {
        self.transition(RoundState::Idle);

        let specs = match self.prepare(shards, params).await {
            Ok(specs) => specs,
            Err(e) => {
                self.transition(RoundState::Failed);
                return Err(e);
            }
        };
        self.transition(RoundState::TopologyBuilt);

        let tasks = shards
            .iter()
            .zip(specs)
            .map(|(shard, spec)| self.cluster.submit_train(&shard.worker, spec));

        self.transition(RoundState::Dispatched);
        let results = join_all(tasks).await;
        self.transition(RoundState::Reducing);

        match reduce(results) {
            Ok(model) => {
                self.transition(RoundState::Done);
                Ok(TrainedModel::new(model, Arc::clone(&self.engine)))
            }
            Err(e) => {
                self.transition(RoundState::Failed);
                Err(e)
            }
        }
    }

    /// Validates the round and builds one `TrainSpec` per shard, in round order.
    async fn prepare(&self, shards: &WorkerShards, params: &Params) -> Result<Vec<TrainSpec>> {
        if shards.is_empty() {
            return Err(CoordinatorErr::NoWorkers);
        }

        let config = RoundConfig::from_params(params)?;
        let addresses = shards.addresses();

        for worker in &addresses {
            build_topology(&addresses, worker, config.base_port, config.listen_time_out)?;
        }

        let ncores: HashMap<_, _> = self
            .cluster
            .workers()
            .await?
            .into_iter()
            .map(|w| (w.address, w.ncores))
            .collect();

        if let Some(stranger) = shards.iter().find(|s| !ncores.contains_key(&s.worker)) {
            return Err(CoordinatorErr::InvalidConfig(format!(
                "{} is not part of the cluster",
                stranger.worker
            )));
        }

        let mut params = params.clone();
        ensure_tree_learner(&mut params);

        let master = shards.master();
        let addresses: Vec<String> = addresses.iter().map(ToString::to_string).collect();

        let specs = shards
            .iter()
            .map(|shard| {
                let mut params = params.clone();
                if let Some(&n) = ncores.get(&shard.worker) {
                    params.set(NUM_THREADS, n);
                }

                TrainSpec {
                    worker: shard.worker.to_string(),
                    addresses: addresses.clone(),
                    base_port: config.base_port,
                    listen_time_out: config.listen_time_out,
                    params,
                    parts: shard.parts.clone(),
                    return_model: master == Some(&shard.worker),
                }
            })
            .collect();

        info!(
            workers = shards.len(),
            base_port = config.base_port;
            "round prepared, master is {}",
            master.map_or("nobody", |m| m.as_str())
        );

        Ok(specs)
    }

    fn transition(&self, next: RoundState) {
        let mut state = self.state.lock();
        if *state != next {
            info!("round {:?} -> {next:?}", *state);
        }
        *state = next;
    }
}

/// Reduces the outcomes of every task of a round to its single model.
///
/// # Errors
/// * The first failure, the rest are only logged.
/// * `CoordinatorErr::InconsistentResult` if there isn't exactly one model.
pub fn reduce(results: Vec<TrainingResult>) -> Result<Model> {
    let mut models = Vec::with_capacity(1);
    let mut failures = Vec::new();

    for result in results {
        match result {
            TrainingResult::Trained(model) => models.push(model),
            TrainingResult::NoModel => {}
            TrainingResult::Failed(failure) => failures.push(failure),
        }
    }

    let mut failures = failures.into_iter();
    if let Some(first) = failures.next() {
        for other in failures {
            warn!(worker = other.worker.as_str(); "also failed: {}", other.msg);
        }
        return Err(first.into());
    }

    match models.len() {
        1 => Ok(models.remove(0)),
        n => Err(CoordinatorErr::InconsistentResult { models: n }),
    }
}

/// Forces a distributed `tree_learner`, `data` is used when it's missing or unknown.
fn ensure_tree_learner(params: &mut Params) {
    let learner = params.get(TREE_LEARNER).and_then(|v| v.as_str());

    let valid = learner.is_some_and(|l| TREE_LEARNERS.contains(&l.to_lowercase().as_str()));
    if !valid {
        warn!(
            "parameter {TREE_LEARNER} not set or set to an incorrect value ({}), using \"data\"",
            learner.unwrap_or("none")
        );
        params.set(TREE_LEARNER, "data");
    }
}
