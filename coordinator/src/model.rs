use std::{fmt, sync::Arc};

use booster::{Engine, Model, Predictions};
use ndarray::ArrayView2;

use crate::Result;

/// The outcome of a successful round: the master worker's model plus the
/// engine that understands it.
#[derive(Clone)]
pub struct TrainedModel {
    model: Model,
    engine: Arc<dyn Engine>,
}

impl TrainedModel {
    pub fn new(model: Model, engine: Arc<dyn Engine>) -> Self {
        Self { model, engine }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// A handle predicting in this process, without the cluster.
    pub fn to_local(&self) -> LocalModel {
        LocalModel {
            model: self.model.clone(),
            engine: Arc::clone(&self.engine),
        }
    }
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// A trained model used for local prediction.
#[derive(Clone)]
pub struct LocalModel {
    model: Model,
    engine: Arc<dyn Engine>,
}

impl LocalModel {
    /// Predicts one value per row of `x`.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::Engine` if the engine rejects `x`.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Predictions> {
        if x.nrows() == 0 {
            return Ok(Predictions::empty());
        }

        Ok(self.engine.predict(&self.model, x)?)
    }

    /// Predicts the class probabilities of every row of `x`.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::Engine` if the engine rejects `x` or the
    /// model isn't a classifier.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Predictions> {
        if x.nrows() == 0 {
            return Ok(Predictions::empty());
        }

        Ok(self.engine.predict_proba(&self.model, x)?)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }
}

impl fmt::Debug for LocalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalModel")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
