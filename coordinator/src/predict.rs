use std::sync::Arc;

use booster::{EngineErr, Predictions};
use comms::specs::{PredictKind, PredictSpec};
use futures::future::join_all;
use log::debug;

use crate::{Cluster, CoordinatorErr, DistributedDataset, Result, TrainedModel};

/// The outputs of a distributed prediction, one block per input partition
/// and in partition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionBatch {
    outputs: Vec<Predictions>,
}

impl PredictionBatch {
    pub fn outputs(&self) -> &[Predictions] {
        &self.outputs
    }

    /// The amount of blocks.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Stacks every block into the predictions of the whole dataset.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::Engine` if the blocks disagree on the amount
    /// of columns.
    pub fn concat(&self) -> Result<Predictions> {
        let mut blocks = self.outputs.iter().filter(|p| !p.is_empty()).peekable();
        let Some(cols) = blocks.peek().map(|p| p.cols()) else {
            return Ok(Predictions::empty());
        };

        let mut rows = 0;
        let mut values = Vec::new();
        for block in blocks {
            if block.cols() != cols {
                return Err(EngineErr::InvalidData(format!(
                    "prediction blocks have {cols} and {} columns",
                    block.cols()
                ))
                .into());
            }

            rows += block.rows();
            values.extend_from_slice(block.values());
        }

        Ok(Predictions::new(rows, cols, values)?)
    }
}

/// Runs predictions of a trained model next to the partitions they read.
pub struct PredictionDispatcher<C: Cluster + ?Sized> {
    cluster: Arc<C>,
}

impl<C: Cluster + ?Sized> PredictionDispatcher<C> {
    pub fn new(cluster: Arc<C>) -> Self {
        Self { cluster }
    }

    /// Predicts one value per row of every partition of `data`.
    ///
    /// # Errors
    /// Returns the first failure of any task, the whole call fails with it.
    pub async fn predict(
        &self,
        model: &TrainedModel,
        data: &DistributedDataset,
    ) -> Result<PredictionBatch> {
        self.dispatch(model, data, PredictKind::Values).await
    }

    /// Predicts the class probabilities of every row of every partition of `data`.
    ///
    /// # Errors
    /// Returns the first failure of any task, the whole call fails with it.
    pub async fn predict_proba(
        &self,
        model: &TrainedModel,
        data: &DistributedDataset,
    ) -> Result<PredictionBatch> {
        self.dispatch(model, data, PredictKind::Probabilities).await
    }

    async fn dispatch(
        &self,
        model: &TrainedModel,
        data: &DistributedDataset,
        kind: PredictKind,
    ) -> Result<PredictionBatch> {
        let tasks = data.placements().iter().map(|placement| {
            let spec = PredictSpec {
                model: model.model().clone(),
                part: placement.key.clone(),
                kind,
            };
            self.cluster.submit_predict(&placement.worker, spec)
        });

        debug!(parts = data.len(); "dispatching {kind:?} predictions");

        let outputs = join_all(tasks)
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoordinatorErr::from)?;

        Ok(PredictionBatch { outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_skips_empty_blocks() {
        let batch = PredictionBatch {
            outputs: vec![
                Predictions::column(vec![1.0, 2.0]),
                Predictions::empty(),
                Predictions::column(vec![3.0]),
            ],
        };

        let all = batch.concat().unwrap();
        assert_eq!(all.values(), &[1.0, 2.0, 3.0]);
        assert_eq!(all.rows(), 3);
    }

    #[test]
    fn concat_rejects_mixed_shapes() {
        let batch = PredictionBatch {
            outputs: vec![
                Predictions::column(vec![1.0]),
                Predictions::new(1, 2, vec![0.5, 0.5]).unwrap(),
            ],
        };
        assert!(batch.concat().is_err());
        assert!(PredictionBatch::default().concat().unwrap().is_empty());
    }
}
