use std::{env, sync::Arc};

use anyhow::Context;
use booster::{BaselineEngine, Dataset, Engine};
use coordinator::{
    Cluster, LocalCluster, PredictionDispatcher, RemoteCluster, RoundCoordinator, SessionConfig,
    configs::DatasetConfig,
};
use log::info;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng, rngs::StdRng};

const LOCAL_FIRST_PORT: u16 = 8786;

/// Builds a noisy linear regression problem.
fn synthetic(config: &DatasetConfig) -> anyhow::Result<Dataset> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let coefs: Vec<f64> = (0..config.cols).map(|_| rng.random_range(-2.0..2.0)).collect();
    let x = Array2::from_shape_fn((config.rows, config.cols), |_| rng.random_range(-1.0..1.0));
    let y: Array1<f64> = x
        .rows()
        .into_iter()
        .map(|row| row.iter().zip(&coefs).map(|(a, b)| a * b).sum::<f64>())
        .collect();
    let noise = Array1::from_shape_fn(config.rows, |_| rng.random_range(-0.1..0.1));

    Ok(Dataset::new(x, y + noise, None)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let session = match env::args().nth(1) {
        Some(path) => SessionConfig::from_path(&path)
            .with_context(|| format!("failed to load the session config at {path}"))?,
        None => SessionConfig::default(),
    };

    let engine: Arc<dyn Engine> = Arc::new(BaselineEngine::new());
    let cluster: Arc<dyn Cluster> = if session.workers.is_empty() {
        let workers = session.local_workers.get();
        info!(workers = workers; "starting an in-process cluster");
        Arc::new(LocalCluster::with_workers(
            Arc::clone(&engine),
            workers,
            LOCAL_FIRST_PORT,
        )?)
    } else {
        Arc::new(RemoteCluster::connect(session.workers.clone()).await?)
    };

    let dataset = synthetic(&session.dataset)?;
    let parts = dataset.chunks(session.dataset.chunk_rows);
    let data = cluster.scatter(parts).await?;
    info!(parts = data.len(), rows = data.rows(); "dataset scattered");

    let coordinator = RoundCoordinator::new(Arc::clone(&cluster), Arc::clone(&engine));
    let model = coordinator.fit(&data, &session.params).await?;

    let dispatcher = PredictionDispatcher::new(Arc::clone(&cluster));
    let preds = dispatcher.predict(&model, &data).await?.concat()?;
    let local = model.to_local().predict(dataset.features())?;
    cluster.release(&data).await?;

    let labels = dataset.labels().context("the dataset has no labels")?;
    let mse = labels
        .iter()
        .zip(preds.values())
        .map(|(y, p)| (y - p).powi(2))
        .sum::<f64>()
        / labels.len().max(1) as f64;

    println!("trained model: {}", model.model().as_str());
    println!("distributed predictions match local ones: {}", preds == local);
    println!("training mse: {mse:.4}");

    Ok(())
}
