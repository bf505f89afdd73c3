use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use booster::{
    BaselineEngine, Dataset, Engine, EngineErr, Model, Params, Predictions,
    network::{NetworkConfig, Ring},
};
use coordinator::{
    Cluster, CoordinatorErr, LocalCluster, RoundCoordinator, RoundState, TopologyErr, WorkerAddress,
    WorkerShard, WorkerShards,
};
use ndarray::{Array1, Array2, ArrayView2};
use parking_lot::Mutex;

/// Joins the ring for real, fails `fit` on `fail_port` while it has failures left.
#[derive(Default)]
struct TestEngine {
    fail_port: Option<u16>,
    failures_left: AtomicUsize,
    joins: AtomicUsize,
    fits: Mutex<Vec<Params>>,
}

impl TestEngine {
    fn failing_on(port: u16, times: usize) -> Self {
        Self {
            fail_port: Some(port),
            failures_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }
}

impl Engine for TestEngine {
    fn join(&self, params: &Params) -> booster::Result<Ring> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        Ring::connect(&NetworkConfig::from_params(params)?)
    }

    fn fit(&self, params: &Params, data: &Dataset) -> booster::Result<Model> {
        self.fits.lock().push(params.clone());

        let port = params.get_u64("local_listen_port")?.map(|p| p as u16);
        if port.is_some() && port == self.fail_port {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(EngineErr::InvalidData("injected failure".into()));
            }
        }

        BaselineEngine.fit(params, data)
    }

    fn predict(&self, model: &Model, x: ArrayView2<'_, f64>) -> booster::Result<Predictions> {
        BaselineEngine.predict(model, x)
    }

    fn predict_proba(&self, model: &Model, x: ArrayView2<'_, f64>) -> booster::Result<Predictions> {
        BaselineEngine.predict_proba(model, x)
    }
}

/// `rows` rows labeled `offset, offset + 1, ...`.
fn labeled(rows: usize, offset: f64) -> Dataset {
    let x = Array2::from_shape_fn((rows, 2), |(i, j)| (i + j) as f64);
    let y = Array1::from_shape_fn(rows, |i| offset + i as f64);
    Dataset::new(x, y, None).unwrap()
}

fn params(base_port: u16) -> Params {
    Params::new()
        .with("objective", "regression")
        .with("local_listen_port", base_port)
        .with("listen_time_out", 10)
}

fn setup(engine: TestEngine, workers: usize) -> (Arc<TestEngine>, Arc<LocalCluster>) {
    let engine = Arc::new(engine);
    let cluster = LocalCluster::with_workers(engine.clone(), workers, 41000).unwrap();
    (engine, Arc::new(cluster))
}

fn addr(port: u16) -> WorkerAddress {
    format!("tcp://127.0.0.1:{port}").parse().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn round_returns_the_master_model() {
    let (engine, cluster) = setup(TestEngine::default(), 3);
    let parts = (0..6).map(|i| labeled(2, 10.0 * i as f64)).collect();
    let data = cluster.scatter(parts).await.unwrap();

    let coordinator = RoundCoordinator::new(cluster.clone(), engine.clone());
    let model = coordinator.fit(&data, &params(23400)).await.unwrap();
    assert_eq!(coordinator.state(), RoundState::Done);

    // The first worker holds parts 0 and 3, labels 0, 1, 30 and 31.
    let preds = model.to_local().predict(labeled(1, 0.0).features()).unwrap();
    assert_eq!(preds.values(), &[15.5]);

    assert_eq!(engine.joins.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_task_sees_the_same_machines() {
    let engine = Arc::new(TestEngine::default());
    let addresses = vec![addr(41000), addr(41001)];
    let cluster = Arc::new(LocalCluster::new(engine.clone(), addresses.clone(), 4));

    let placements = vec![
        cluster.place(&addresses[0], labeled(3, 0.0)).unwrap(),
        cluster.place(&addresses[1], labeled(3, 0.0)).unwrap(),
    ];
    let shards = WorkerShards::from_placements(&placements);

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    coordinator
        .train(&shards, &params(23490).with("tree_learner", "serial").with("num_threads", 64))
        .await
        .unwrap();

    let fits = engine.fits.lock();
    assert_eq!(fits.len(), 2);

    let mut ports: Vec<_> = fits
        .iter()
        .map(|p| p.get_u64("local_listen_port").unwrap().unwrap())
        .collect();
    ports.sort();
    assert_eq!(ports, vec![23490, 23491]);

    for p in fits.iter() {
        assert_eq!(
            p.get_str("machines").unwrap(),
            Some("127.0.0.1:23490,127.0.0.1:23491")
        );
        assert_eq!(p.get_u64("num_machines").unwrap(), Some(2));
        assert_eq!(p.get_str("tree_learner").unwrap(), Some("data"));
        assert_eq!(p.get_u64("num_threads").unwrap(), Some(4));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn one_failure_fails_the_whole_round() {
    let (engine, cluster) = setup(TestEngine::failing_on(23411, usize::MAX), 3);
    let parts = (0..3).map(|_| labeled(4, 0.0)).collect();
    let data = cluster.scatter(parts).await.unwrap();

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    let err = coordinator.fit(&data, &params(23410)).await.unwrap_err();

    assert!(matches!(
        err,
        CoordinatorErr::WorkerTaskFailure { ref worker, .. } if worker == "tcp://127.0.0.1:41001"
    ));
    assert_eq!(coordinator.state(), RoundState::Failed);
    assert_eq!(engine.fits.lock().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_shards_take_part_without_data() {
    let engine = Arc::new(TestEngine::default());
    let addresses = vec![addr(41000), addr(41001), addr(41002)];
    let cluster = Arc::new(LocalCluster::new(engine.clone(), addresses.clone(), 1));

    let placements = vec![
        cluster.place(&addresses[0], Dataset::empty(2)).unwrap(),
        cluster.place(&addresses[1], labeled(2, 100.0)).unwrap(),
        cluster.place(&addresses[2], labeled(2, 0.0)).unwrap(),
    ];
    let shards = WorkerShards::from_placements(&placements);
    assert_eq!(shards.master(), Some(&addresses[1]));

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    let model = coordinator.train(&shards, &params(23420)).await.unwrap();

    let preds = model.to_local().predict(labeled(1, 0.0).features()).unwrap();
    assert_eq!(preds.values(), &[100.5]);
    assert_eq!(engine.joins.load(Ordering::SeqCst), 3);
    assert_eq!(engine.fits.lock().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn only_empty_shards_is_inconsistent() {
    let engine = Arc::new(TestEngine::default());
    let addresses = vec![addr(41000), addr(41001)];
    let cluster = Arc::new(LocalCluster::new(engine.clone(), addresses.clone(), 1));

    let placements = vec![
        cluster.place(&addresses[0], Dataset::empty(2)).unwrap(),
        cluster.place(&addresses[1], Dataset::empty(2)).unwrap(),
    ];
    let shards = WorkerShards::from_placements(&placements);

    let coordinator = RoundCoordinator::new(cluster, engine);
    let err = coordinator.train(&shards, &params(23430)).await.unwrap_err();
    assert!(matches!(err, CoordinatorErr::InconsistentResult { models: 0 }));
}

#[tokio::test(flavor = "multi_thread")]
async fn poisoned_partition_fails_before_dispatch() {
    let (engine, cluster) = setup(TestEngine::default(), 2);
    let parts = (0..4).map(|_| labeled(2, 0.0)).collect();
    let data = cluster.scatter(parts).await.unwrap();

    assert!(cluster.poison(&data.placements()[3].key, "worker ran out of memory"));

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    let err = coordinator.fit(&data, &params(23440)).await.unwrap_err();

    assert!(matches!(err, CoordinatorErr::WorkerTaskFailure { .. }));
    assert_eq!(coordinator.state(), RoundState::Failed);
    assert_eq!(engine.joins.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_is_a_fresh_round() {
    let (engine, cluster) = setup(TestEngine::failing_on(23450, 1), 2);
    let parts = (0..2).map(|_| labeled(2, 1.0)).collect();
    let data = cluster.scatter(parts).await.unwrap();

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    assert!(coordinator.fit(&data, &params(23450)).await.is_err());

    // The failed round released its ports, the same range works again.
    let same_range = coordinator.fit(&data, &params(23450)).await.unwrap();
    let fresh_range = coordinator.fit(&data, &params(23460)).await.unwrap();
    assert_eq!(same_range.model(), fresh_range.model());
    assert_eq!(coordinator.state(), RoundState::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_topology_never_dispatches() {
    let (engine, cluster) = setup(TestEngine::default(), 2);
    let parts = (0..2).map(|_| labeled(2, 0.0)).collect();
    let data = cluster.scatter(parts).await.unwrap();

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    let err = coordinator.fit(&data, &params(u16::MAX)).await.unwrap_err();

    assert!(matches!(
        err,
        CoordinatorErr::Topology(TopologyErr::PortRangeExhausted { workers: 2, .. })
    ));
    assert_eq!(coordinator.state(), RoundState::Failed);
    assert_eq!(engine.joins.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn no_shards_no_round() {
    let (engine, cluster) = setup(TestEngine::default(), 2);
    let coordinator = RoundCoordinator::new(cluster, engine);

    let err = coordinator
        .train(&WorkerShards::default(), &params(23470))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorErr::NoWorkers));
}

#[tokio::test(flavor = "multi_thread")]
async fn shard_outside_the_cluster_never_dispatches() {
    let engine = Arc::new(TestEngine::default());
    let cluster = Arc::new(LocalCluster::new(engine.clone(), vec![addr(41000)], 1));
    let known = cluster.place(&addr(41000), labeled(2, 0.0)).unwrap();

    let shards: WorkerShards = [
        WorkerShard {
            worker: known.worker,
            parts: vec![known.key],
            rows: known.rows,
        },
        WorkerShard {
            worker: addr(49999),
            parts: vec!["part-99".into()],
            rows: 2,
        },
    ]
    .into_iter()
    .collect();

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    let err = coordinator.train(&shards, &params(23480)).await.unwrap_err();

    assert!(matches!(
        err,
        CoordinatorErr::InvalidConfig(ref msg) if msg.contains("tcp://127.0.0.1:49999")
    ));
    assert_eq!(coordinator.state(), RoundState::Failed);
    assert_eq!(engine.joins.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn ipv6_workers_form_the_ring() {
    let engine = Arc::new(TestEngine::default());
    let addresses: Vec<WorkerAddress> = ["tcp://[::1]:41000", "tcp://[::1]:41001"]
        .into_iter()
        .map(|a| a.parse().unwrap())
        .collect();
    let cluster = Arc::new(LocalCluster::new(engine.clone(), addresses.clone(), 1));

    let placements = vec![
        cluster.place(&addresses[0], labeled(2, 7.0)).unwrap(),
        cluster.place(&addresses[1], labeled(2, 0.0)).unwrap(),
    ];
    let shards = WorkerShards::from_placements(&placements);

    let coordinator = RoundCoordinator::new(cluster, engine.clone());
    let model = coordinator.train(&shards, &params(23436)).await.unwrap();

    let preds = model.to_local().predict(labeled(1, 0.0).features()).unwrap();
    assert_eq!(preds.values(), &[7.5]);
    assert_eq!(
        engine.fits.lock()[0].get_str("machines").unwrap(),
        Some("::1:23436,::1:23437")
    );
}
