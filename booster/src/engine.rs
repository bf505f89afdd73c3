use ndarray::ArrayView2;

use crate::{
    Dataset, Model, Params, Predictions, Result,
    network::{NetworkConfig, Ring},
};

/// The single machine boosting engine run on every worker.
///
/// Every entry point is synchronous and blocks the calling thread until it's done.
pub trait Engine: Send + Sync {
    /// Joins the ring described by the network keys of `params`. Dropping the
    /// returned `Ring` leaves it and releases the listening socket.
    fn join(&self, params: &Params) -> Result<Ring> {
        let config = NetworkConfig::from_params(params)?;
        Ring::connect(&config)
    }

    /// Trains a model on `data` using `params`.
    fn fit(&self, params: &Params, data: &Dataset) -> Result<Model>;

    /// Predicts one value per row of `x`.
    fn predict(&self, model: &Model, x: ArrayView2<'_, f64>) -> Result<Predictions>;

    /// Predicts the class probabilities of every row of `x`.
    fn predict_proba(&self, model: &Model, x: ArrayView2<'_, f64>) -> Result<Predictions>;
}
