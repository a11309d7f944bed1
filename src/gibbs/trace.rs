use crate::shared::distributions::{exponential_responsibilities, sample_categorical};
use crate::shared::errors::RtaError;
use anyhow::Result;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Saved history of the chain. Row `r` holds the state after iteration `r * g`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PosteriorTrace {
    pub ncomp: usize,
    pub g: usize,
    pub burnin: usize,
    // (rows x ncomp)
    pub weights: Array2<f64>,
    pub rates: Array2<f64>,
    // (rows x events), may be empty for old artifacts (see `ensure_indicator`)
    #[serde(default = "empty_indicator")]
    pub indicator: Array2<u8>,
}

fn empty_indicator() -> Array2<u8> {
    Array2::zeros((0, 0))
}

/// The part of the trace used for the estimation
#[derive(Clone, Debug)]
pub struct TraceView<'a> {
    // index of the first kept row in the full trace
    pub first_row: usize,
    pub weights: ArrayView2<'a, f64>,
    pub rates: ArrayView2<'a, f64>,
    pub indicator: ArrayView2<'a, u8>,
}

impl PosteriorTrace {
    pub fn nb_rows(&self) -> usize {
        self.weights.nrows()
    }

    /// Iteration number of a saved row
    pub fn iteration(&self, row: usize) -> usize {
        row * self.g
    }

    pub fn burnin_index(&self) -> usize {
        self.burnin / self.g
    }

    /// Drop the first `burnin / g` saved rows.
    pub fn after_burnin(&self) -> TraceView<'_> {
        let first_row = self.burnin_index().min(self.nb_rows());
        TraceView {
            first_row,
            weights: self.weights.slice(s![first_row.., ..]),
            rates: self.rates.slice(s![first_row.., ..]),
            indicator: self.indicator.slice(s![first_row.min(self.indicator.nrows()).., ..]),
        }
    }

    pub fn has_indicator(&self, nb_events: usize) -> bool {
        self.indicator.dim() == (self.nb_rows(), nb_events)
    }

    /// Structural checks on a trace coming from disk
    pub fn check(&self) -> Result<()> {
        if self.g == 0 || self.ncomp == 0 {
            return Err(RtaError::Numerical("trace with zero thinning or components".into()).into());
        }
        if self.weights.dim() != self.rates.dim() || self.weights.ncols() != self.ncomp {
            return Err(RtaError::Numerical(format!(
                "inconsistent trace shapes: weights {:?}, rates {:?}, ncomp {}",
                self.weights.dim(),
                self.rates.dim(),
                self.ncomp
            ))
            .into());
        }
        if self.indicator.iter().any(|&k| k as usize >= self.ncomp) {
            return Err(RtaError::Numerical("indicator outside of [0, ncomp)".into()).into());
        }
        Ok(())
    }

    /// Regenerate the indicator matrix from the saved weights and rates when
    /// it is missing.
    pub fn ensure_indicator<R: Rng>(&mut self, times: &[f64], rng: &mut R) -> Result<()> {
        if self.has_indicator(times.len()) {
            return Ok(());
        }
        let mut indicator = Array2::<u8>::zeros((self.nb_rows(), times.len()));
        let mut probas = Array1::<f64>::zeros(self.ncomp);
        for (row, (w, r)) in self
            .weights
            .outer_iter()
            .zip(self.rates.outer_iter())
            .enumerate()
        {
            let log_weights = w.mapv(f64::ln);
            for (i, &t) in times.iter().enumerate() {
                exponential_responsibilities(log_weights.view(), r, t, &mut probas);
                indicator[[row, i]] = sample_categorical(probas.view(), rng)? as u8;
            }
        }
        self.indicator = indicator;
        Ok(())
    }
}

impl<'a> TraceView<'a> {
    pub fn nb_rows(&self) -> usize {
        self.weights.nrows()
    }

    /// Indices of the components above `cutoff` in one row
    pub fn significant(&self, row: usize, cutoff: f64) -> Vec<usize> {
        significant_components(self.weights.row(row), cutoff)
    }

    /// Number of significant components for every row
    pub fn significant_counts(&self, cutoff: f64) -> Vec<usize> {
        self.weights
            .outer_iter()
            .map(|w| w.iter().filter(|&&x| x > cutoff).count())
            .collect()
    }
}

pub fn significant_components(weights: ArrayView1<f64>, cutoff: f64) -> Vec<usize> {
    weights
        .iter()
        .enumerate()
        .filter(|(_, &w)| w > cutoff)
        .map(|(k, _)| k)
        .collect()
}
