//! Rescaling of aligned grids onto a common [0, 1] range before plotting

use crate::core::alignment::AlignedGrid;
use crate::types::{CompareError, CompareResult};
use serde::{Deserialize, Serialize};

/// Cut-off rule mapping `low -> 0` and `high -> 1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Normalization {
    /// Cut-offs taken from the data's own percentiles (0-100)
    Percentile { low: f64, high: f64 },
    /// Fixed cut-off values
    Absolute { low: f64, high: f64 },
}

impl Normalization {
    /// Full data range, i.e. the 0th and 100th percentiles
    pub fn min_max() -> Self {
        Normalization::Percentile {
            low: 0.0,
            high: 100.0,
        }
    }

    /// Resolve the cut-off values for `values`
    pub fn cutoffs(&self, values: &[f64]) -> CompareResult<(f64, f64)> {
        let (low, high) = match *self {
            Normalization::Percentile { low, high } => {
                (percentile(values, low)?, percentile(values, high)?)
            }
            Normalization::Absolute { low, high } => (low, high),
        };

        if !(high - low).is_normal() {
            return Err(CompareError::InvalidNormalization(format!(
                "cut-offs {} and {} do not span a usable range",
                low, high
            )));
        }
        Ok((low, high))
    }

    /// `(v - low) / (high - low)` for every value
    pub fn apply(&self, values: &[f64]) -> CompareResult<Vec<f64>> {
        let (low, high) = self.cutoffs(values)?;
        let span = high - low;
        Ok(values.iter().map(|v| (v - low) / span).collect())
    }

    /// Normalize a whole aligned grid, keeping its label and shape
    pub fn apply_grid(&self, grid: &AlignedGrid) -> CompareResult<AlignedGrid> {
        let (low, high) = self.cutoffs(&grid.flatten())?;
        let span = high - low;
        log::debug!("Normalizing {} with cut-offs {} .. {}", grid.label, low, high);

        Ok(AlignedGrid {
            label: grid.label.clone(),
            data: grid.data.mapv(|v| (v - low) / span),
        })
    }
}

/// `p`-th percentile (0-100) using linear interpolation between closest ranks.
/// NaN values are ignored.
pub fn percentile(values: &[f64], p: f64) -> CompareResult<f64> {
    if !(0.0..=100.0).contains(&p) {
        return Err(CompareError::InvalidNormalization(format!(
            "percentile {} is outside 0..100",
            p
        )));
    }

    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return Err(CompareError::InvalidNormalization(
            "no valid values to take a percentile of".to_string(),
        ));
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}
