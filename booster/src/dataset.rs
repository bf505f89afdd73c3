use std::num::NonZeroUsize;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate, s};
use serde::{Deserialize, Serialize};

use crate::{EngineErr, Result};

/// A block of rows: features, optional labels and optional sample weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    x: Array2<f64>,
    y: Option<Array1<f64>>,
    w: Option<Array1<f64>>,
}

impl Dataset {
    /// Creates a new labeled dataset.
    ///
    /// # Arguments
    /// * `x` - The features, one row per sample.
    /// * `y` - The labels, one per row.
    /// * `w` - The sample weights, one per row.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidData` if the lengths don't match the amount of rows.
    pub fn new(x: Array2<f64>, y: Array1<f64>, w: Option<Array1<f64>>) -> Result<Self> {
        check_len("labels", y.len(), x.nrows())?;
        if let Some(w) = &w {
            check_len("weights", w.len(), x.nrows())?;
        }

        Ok(Self { x, y: Some(y), w })
    }

    /// Creates a dataset with features only, usable for inference.
    pub fn unlabeled(x: Array2<f64>) -> Self {
        Self { x, y: None, w: None }
    }

    /// Creates a labeled dataset without rows.
    pub fn empty(cols: usize) -> Self {
        Self {
            x: Array2::zeros((0, cols)),
            y: Some(Array1::zeros(0)),
            w: None,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.x.nrows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.x.ncols()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn labels(&self) -> Option<ArrayView1<'_, f64>> {
        self.y.as_ref().map(Array1::view)
    }

    pub fn weights(&self) -> Option<ArrayView1<'_, f64>> {
        self.w.as_ref().map(Array1::view)
    }

    /// Splits the dataset into contiguous blocks of at most `rows` rows.
    ///
    /// A dataset without rows yields a single empty block.
    pub fn chunks(&self, rows: NonZeroUsize) -> Vec<Dataset> {
        if self.is_empty() {
            return vec![self.clone()];
        }

        let total = self.rows();
        (0..total)
            .step_by(rows.get())
            .map(|start| {
                let end = (start + rows.get()).min(total);
                Dataset {
                    x: self.x.slice(s![start..end, ..]).to_owned(),
                    y: self.y.as_ref().map(|y| y.slice(s![start..end]).to_owned()),
                    w: self.w.as_ref().map(|w| w.slice(s![start..end]).to_owned()),
                }
            })
            .collect()
    }

    /// Stacks many blocks into one, keeping their order.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidData` if `parts` is empty, the blocks have a different
    /// amount of columns or only some of them carry labels or weights.
    pub fn concat(parts: &[&Dataset]) -> Result<Dataset> {
        let Some(first) = parts.first() else {
            return Err(EngineErr::InvalidData(
                "there are no partitions to concatenate".into(),
            ));
        };

        let cols = first.cols();
        if let Some(part) = parts.iter().find(|part| part.cols() != cols) {
            return Err(EngineErr::InvalidData(format!(
                "partitions have a different amount of columns, {cols} and {}",
                part.cols()
            )));
        }

        let xs: Vec<_> = parts.iter().map(|part| part.x.view()).collect();
        let x = concatenate(Axis(0), &xs).map_err(|e| EngineErr::InvalidData(e.to_string()))?;
        let y = concat_column("labels", parts.iter().map(|part| part.y.as_ref()))?;
        let w = concat_column("weights", parts.iter().map(|part| part.w.as_ref()))?;

        Ok(Dataset { x, y, w })
    }
}

fn concat_column<'a, I>(what: &str, columns: I) -> Result<Option<Array1<f64>>>
where
    I: Iterator<Item = Option<&'a Array1<f64>>>,
{
    let columns: Vec<_> = columns.collect();
    if columns.iter().all(Option::is_none) {
        return Ok(None);
    }

    let views = columns
        .iter()
        .map(|column| column.map(Array1::view))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            EngineErr::InvalidData(format!("only some of the partitions carry {what}"))
        })?;

    concatenate(Axis(0), &views)
        .map(Some)
        .map_err(|e| EngineErr::InvalidData(e.to_string()))
}

fn check_len(what: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(EngineErr::InvalidData(format!(
            "the amount of {what} ({got}) doesn't match the amount of rows ({expected})"
        )));
    }

    Ok(())
}
