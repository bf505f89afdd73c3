//! Reference engine: fits the objective's initial score and nothing else.
//!
//! It joins the ring like any distributed engine would but never exchanges
//! statistics over it, so a distributed fit sees only the local shard.

use log::info;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{Dataset, Engine, EngineErr, Model, Params, Predictions, Result};

const EPS: f64 = 1e-15;

/// The learning objectives understood by the `BaselineEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Objective {
    Regression,
    Quantile { alpha: f64 },
    Binary,
    Multiclass { num_class: usize },
}

impl Objective {
    /// Reads `objective` (plus `alpha` or `num_class` where needed) from `params`.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidParam` on unknown objectives or out of range values.
    pub fn from_params(params: &Params) -> Result<Self> {
        let name = params.get_str("objective")?.unwrap_or("regression");

        match name {
            "regression" | "regression_l2" | "l2" | "mse" => Ok(Self::Regression),
            "quantile" => {
                let alpha = params.get_f64("alpha")?.unwrap_or(0.9);
                if !(alpha > 0.0 && alpha < 1.0) {
                    return Err(EngineErr::InvalidParam {
                        key: "alpha",
                        msg: format!("must be in (0, 1), got {alpha}"),
                    });
                }
                Ok(Self::Quantile { alpha })
            }
            "binary" => Ok(Self::Binary),
            "multiclass" | "softmax" => {
                let num_class = params.get_u64("num_class")?.unwrap_or(0) as usize;
                if num_class < 2 {
                    return Err(EngineErr::InvalidParam {
                        key: "num_class",
                        msg: format!("multiclass needs at least 2 classes, got {num_class}"),
                    });
                }
                Ok(Self::Multiclass { num_class })
            }
            other => Err(EngineErr::InvalidParam {
                key: "objective",
                msg: format!("unknown objective `{other}`"),
            }),
        }
    }

    fn num_scores(&self) -> usize {
        match self {
            Self::Multiclass { num_class } => *num_class,
            _ => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Prior {
    objective: Objective,
    num_features: usize,
    init_score: Vec<f64>,
}

impl Prior {
    fn load(model: &Model) -> Result<Self> {
        let prior: Prior = serde_json::from_str(model.as_str())
            .map_err(|e| EngineErr::InvalidModel(e.to_string()))?;

        if prior.init_score.len() != prior.objective.num_scores() {
            return Err(EngineErr::InvalidModel(format!(
                "expected {} init scores, got {}",
                prior.objective.num_scores(),
                prior.init_score.len()
            )));
        }

        Ok(prior)
    }

    fn check_features(&self, x: &ArrayView2<'_, f64>) -> Result<()> {
        if x.ncols() != self.num_features {
            return Err(EngineErr::InvalidData(format!(
                "the model was trained with {} features, got {}",
                self.num_features,
                x.ncols()
            )));
        }

        Ok(())
    }

    fn probabilities(&self) -> Result<Vec<f64>> {
        match self.objective {
            Objective::Binary => {
                let p = sigmoid(self.init_score[0]);
                Ok(vec![1.0 - p, p])
            }
            Objective::Multiclass { .. } => Ok(softmax(&self.init_score)),
            _ => Err(EngineErr::InvalidModel(
                "class probabilities need a classification objective".into(),
            )),
        }
    }
}

/// The reference `Engine`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaselineEngine;

impl BaselineEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for BaselineEngine {
    fn fit(&self, params: &Params, data: &Dataset) -> Result<Model> {
        let objective = Objective::from_params(params)?;
        let labels = data
            .labels()
            .ok_or_else(|| EngineErr::InvalidData("training needs labels".into()))?;

        if data.is_empty() {
            return Err(EngineErr::InvalidData(
                "can't fit a dataset without rows".into(),
            ));
        }

        let weights = match data.weights() {
            Some(w) => w.to_vec(),
            None => vec![1.0; data.rows()],
        };

        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineErr::InvalidData(
                "weights must be finite and non negative".into(),
            ));
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(EngineErr::InvalidData("the weights sum up to zero".into()));
        }

        let init_score = match objective {
            Objective::Regression => vec![weighted_mean(labels, &weights, total)],
            Objective::Quantile { alpha } => vec![weighted_quantile(labels, &weights, alpha)],
            Objective::Binary => {
                for &y in labels {
                    class_index(y, 2)?;
                }
                let p = weighted_mean(labels, &weights, total).clamp(EPS, 1.0 - EPS);
                vec![(p / (1.0 - p)).ln()]
            }
            Objective::Multiclass { num_class } => {
                let mut class_weights = vec![0.0; num_class];
                for (&y, w) in labels.iter().zip(&weights) {
                    class_weights[class_index(y, num_class)?] += w;
                }
                class_weights
                    .iter()
                    .map(|cw| (cw / total).max(EPS).ln())
                    .collect()
            }
        };

        info!(rows = data.rows(), cols = data.cols(); "fitted {objective:?} prior");

        let prior = Prior {
            objective,
            num_features: data.cols(),
            init_score,
        };

        serde_json::to_string(&prior)
            .map(Model::from_string)
            .map_err(|e| EngineErr::InvalidModel(e.to_string()))
    }

    fn predict(&self, model: &Model, x: ArrayView2<'_, f64>) -> Result<Predictions> {
        let prior = Prior::load(model)?;
        prior.check_features(&x)?;

        let value = match prior.objective {
            Objective::Regression | Objective::Quantile { .. } => prior.init_score[0],
            Objective::Binary | Objective::Multiclass { .. } => argmax(&prior.probabilities()?),
        };

        Ok(Predictions::column(vec![value; x.nrows()]))
    }

    fn predict_proba(&self, model: &Model, x: ArrayView2<'_, f64>) -> Result<Predictions> {
        let prior = Prior::load(model)?;
        prior.check_features(&x)?;

        let probs = prior.probabilities()?;
        let rows = x.nrows();
        let values = probs.iter().copied().cycle().take(rows * probs.len()).collect();
        Predictions::new(rows, probs.len(), values)
    }
}

fn weighted_mean(y: ArrayView1<'_, f64>, w: &[f64], total: f64) -> f64 {
    y.iter().zip(w).map(|(y, w)| y * w).sum::<f64>() / total
}

fn weighted_quantile(y: ArrayView1<'_, f64>, w: &[f64], alpha: f64) -> f64 {
    let mut pairs: Vec<_> = y.iter().copied().zip(w.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let target = alpha * pairs.iter().map(|(_, w)| w).sum::<f64>();
    let mut acc = 0.0;
    for &(y, w) in &pairs {
        acc += w;
        if acc >= target {
            return y;
        }
    }

    // Only reachable through rounding, the last label is the upper bound anyway.
    pairs.last().map_or(0.0, |(y, _)| *y)
}

fn class_index(y: f64, num_class: usize) -> Result<usize> {
    if y.fract() != 0.0 || y < 0.0 || y >= num_class as f64 {
        return Err(EngineErr::InvalidData(format!(
            "label {y} is not a class in 0..{num_class}"
        )));
    }

    Ok(y as usize)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<_> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f64]) -> f64 {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0 as f64
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    fn fit(params: Params, x: Array2<f64>, y: Vec<f64>, w: Option<Vec<f64>>) -> Model {
        let data = Dataset::new(x, y.into(), w.map(Into::into)).unwrap();
        BaselineEngine.fit(&params, &data).unwrap()
    }

    #[test]
    fn regression_predicts_weighted_mean() {
        let x = array![[0.0], [1.0], [2.0]];
        let model = fit(Params::new(), x.clone(), vec![1.0, 2.0, 6.0], Some(vec![1.0, 1.0, 2.0]));

        let preds = BaselineEngine.predict(&model, x.view()).unwrap();
        assert_eq!(preds.values(), &[3.75, 3.75, 3.75]);
        assert_eq!(preds.cols(), 1);
    }

    #[test]
    fn quantile_predicts_weighted_quantile() {
        let x = Array2::zeros((4, 1));
        let params = Params::new().with("objective", "quantile").with("alpha", 0.5);
        let model = fit(params, x.clone(), vec![4.0, 1.0, 3.0, 2.0], None);

        let preds = BaselineEngine.predict(&model, x.view()).unwrap();
        assert_eq!(preds.values()[0], 2.0);
    }

    #[test]
    fn binary_predicts_majority_and_probabilities() {
        let x = Array2::zeros((4, 2));
        let params = Params::new().with("objective", "binary");
        let model = fit(params, x.clone(), vec![1.0, 1.0, 1.0, 0.0], None);

        let labels = BaselineEngine.predict(&model, x.view()).unwrap();
        assert_eq!(labels.values(), &[1.0; 4]);

        let probs = BaselineEngine.predict_proba(&model, x.view()).unwrap();
        assert_eq!(probs.cols(), 2);
        assert!((probs.row(0)[1] - 0.75).abs() < 1e-9);
        assert!((probs.row(3)[0] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn multiclass_probabilities_follow_class_weights() {
        let x = Array2::zeros((4, 1));
        let params = Params::new().with("objective", "multiclass").with("num_class", 3);
        let model = fit(params, x.clone(), vec![0.0, 2.0, 2.0, 1.0], Some(vec![1.0, 1.0, 1.0, 1.0]));

        let probs = BaselineEngine.predict_proba(&model, x.view()).unwrap();
        assert_eq!(probs.cols(), 3);
        let row = probs.row(2);
        assert!((row[0] - 0.25).abs() < 1e-9);
        assert!((row[2] - 0.5).abs() < 1e-9);

        let labels = BaselineEngine.predict(&model, x.view()).unwrap();
        assert_eq!(labels.values(), &[2.0; 4]);
    }

    #[test]
    fn rejects_bad_input() {
        let x = Array2::zeros((2, 1));
        let data = Dataset::new(x.clone(), array![0.0, 5.0], None).unwrap();
        let params = Params::new().with("objective", "binary");
        assert!(BaselineEngine.fit(&params, &data).is_err());

        let params = Params::new().with("objective", "lambdarank");
        assert!(BaselineEngine.fit(&params, &data).is_err());

        assert!(BaselineEngine.fit(&Params::new(), &Dataset::unlabeled(x)).is_err());
        assert!(BaselineEngine.fit(&Params::new(), &Dataset::empty(1)).is_err());
    }

    #[test]
    fn regression_has_no_probabilities() {
        let x = array![[1.0]];
        let model = fit(Params::new(), x.clone(), vec![1.0], None);
        assert!(BaselineEngine.predict_proba(&model, x.view()).is_err());
        assert!(BaselineEngine.predict(&model, array![[1.0, 2.0]].view()).is_err());
    }
}
