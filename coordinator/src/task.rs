//! The per worker tasks of a round, run on the worker itself.
//!
//! Every entry point is synchronous, callers running inside a runtime must
//! move them to a blocking thread.

use booster::{Dataset, Engine, EngineErr, Params, Predictions};
use comms::specs::{FailureKind, PredictKind, PredictSpec, TaskFailure, TrainSpec, TrainingResult};
use log::{debug, info, warn};

use crate::{PartitionStore, Topology, TopologyErr, WorkerAddress, build_topology};

/// Trains the local shard of `worker` as one member of the round's ring.
///
/// The topology's network keys are merged over `params` before they reach the
/// engine. The ring is left on every exit path, which releases the listening
/// port. Failures never escape as errors, they're returned as
/// `TrainingResult::Failed` tagged with the worker's address.
///
/// # Arguments
/// * `engine` - The engine to train with.
/// * `worker` - The address of the worker running this task.
/// * `shard` - The worker's rows, may be empty.
/// * `topology` - The worker's view of the ring.
/// * `params` - The caller's engine parameters.
/// * `return_model` - Whether this worker ships its model.
///
/// # Returns
/// `Trained` only when `return_model` is set and the shard has rows,
/// `NoModel` on any other success.
pub fn train_local(
    engine: &dyn Engine,
    worker: &WorkerAddress,
    shard: &Dataset,
    topology: &Topology,
    params: &Params,
    return_model: bool,
) -> TrainingResult {
    let mut params = params.clone();
    params.merge(topology.to_params());

    let port = topology.local_listen_port();
    debug!(worker = worker.as_str(), port = port; "joining the ring");

    let _ring = match engine.join(&params) {
        Ok(ring) => ring,
        Err(e) => return engine_failure(worker, e),
    };

    if shard.is_empty() {
        info!(worker = worker.as_str(); "empty shard, taking part in the ring without data");
        return TrainingResult::NoModel;
    }

    match engine.fit(&params, shard) {
        Ok(model) if return_model => {
            info!(worker = worker.as_str(), rows = shard.rows(); "trained, shipping the model");
            TrainingResult::Trained(model)
        }
        Ok(_) => {
            debug!(worker = worker.as_str(), rows = shard.rows(); "trained");
            TrainingResult::NoModel
        }
        Err(e) => engine_failure(worker, e),
    }
}

/// Runs a shipped `TrainSpec` against the partitions held in `store`.
///
/// The topology is rebuilt here out of the shipped address list, so it's
/// the same for every worker of the round.
pub fn run_train(engine: &dyn Engine, store: &PartitionStore, spec: &TrainSpec) -> TrainingResult {
    let failed = |kind, msg: String| {
        warn!(worker = spec.worker.as_str(); "{msg}");
        TrainingResult::Failed(TaskFailure::new(&spec.worker, kind, msg))
    };

    let parsed = WorkerAddress::parse(&spec.worker).and_then(|worker| {
        let addresses = spec
            .addresses
            .iter()
            .map(|a| WorkerAddress::parse(a))
            .collect::<Result<Vec<_>, _>>()?;

        let topology = build_topology(&addresses, &worker, spec.base_port, spec.listen_time_out)?;
        Ok((worker, topology))
    });

    let (worker, topology) = match parsed {
        Ok(parsed) => parsed,
        Err(e @ TopologyErr::AddressNotFound { .. }) => {
            return failed(FailureKind::AddressNotFound, e.to_string())
        }
        Err(e) => return failed(FailureKind::Topology, e.to_string()),
    };

    let shard = match store.concat(&spec.parts) {
        Ok(shard) => shard,
        Err(e) => return failed(FailureKind::Partition, e.to_string()),
    };

    train_local(
        engine,
        &worker,
        &shard,
        &topology,
        &spec.params,
        spec.return_model,
    )
}

/// Predicts a single partition held in `store`.
///
/// Partitions without rows yield empty predictions and never reach the engine.
///
/// # Errors
/// Returns a `TaskFailure` tagged with `worker` if the partition can't be
/// read or the engine fails.
pub fn run_predict(
    engine: &dyn Engine,
    store: &PartitionStore,
    worker: &str,
    spec: &PredictSpec,
) -> Result<Predictions, TaskFailure> {
    let part = store
        .get(&spec.part)
        .map_err(|e| TaskFailure::new(worker, FailureKind::Partition, e.to_string()))?;

    if part.is_empty() {
        return Ok(Predictions::empty());
    }

    let x = part.features();
    let preds = match spec.kind {
        PredictKind::Values => engine.predict(&spec.model, x),
        PredictKind::Probabilities => engine.predict_proba(&spec.model, x),
    };

    preds.map_err(|e| TaskFailure::new(worker, FailureKind::Engine, e.to_string()))
}

fn engine_failure(worker: &WorkerAddress, e: EngineErr) -> TrainingResult {
    let kind = match e {
        EngineErr::HandshakeTimeout { .. } => FailureKind::HandshakeTimeout,
        _ => FailureKind::Engine,
    };

    warn!(worker = worker.as_str(); "task failed: {e}");
    TrainingResult::Failed(TaskFailure::new(worker.as_str(), kind, e.to_string()))
}
