use serde::{Deserialize, Serialize};

use crate::{EngineErr, Result};

/// An opaque trained model, kept in the engine's own text format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Model(String);

impl Model {
    pub fn from_string(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Row major engine output: one value per row, or one probability per class and row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Predictions {
    /// Creates a new `Predictions` block.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidData` if `values` isn't `rows * cols` long.
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(values.len()) {
            return Err(EngineErr::InvalidData(format!(
                "expected {rows}x{cols} predictions, got {} values",
                values.len()
            )));
        }

        Ok(Self { rows, cols, values })
    }

    /// One value per row.
    pub fn column(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            values,
        }
    }

    /// The output for a block without rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// # Panics
    /// If `i` is out of bounds.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.cols..(i + 1) * self.cols]
    }
}
