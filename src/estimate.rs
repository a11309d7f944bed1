//! Point estimates and intervals of the clustered posterior, and selection of
//! the dominant residence time.
use crate::cluster::{ClusterLabeling, MembershipIndicator};
use crate::shared::errors::RtaError;
use crate::shared::parameters::ClusterParameters;
use crate::shared::utils::{
    argmax_first, confidence_interval, density_mode, histogram, log_bins, min_max,
};
use anyhow::Result;
#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentEstimate {
    pub label: usize,
    pub nb_samples: usize,
    // density modes
    pub weight: f64,
    pub rate: f64,
    pub weight_interval: (f64, f64),
    pub rate_interval: (f64, f64),
    // largest membership probability of any event in this cluster
    pub max_membership: f64,
    pub is_noise: bool,
}

impl ComponentEstimate {
    pub fn tau(&self) -> f64 {
        1. / self.rate
    }
}

/// Dominant residence time: (lower, mode, upper), in the unit of the durations
#[cfg_attr(all(feature = "py_binds", feature = "pyo3"), pyclass(get_all))]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TauEstimate {
    pub lower: f64,
    pub mode: f64,
    pub upper: f64,
}

impl TauEstimate {
    pub fn zero() -> TauEstimate {
        TauEstimate {
            lower: 0.,
            mode: 0.,
            upper: 0.,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.lower, self.mode, self.upper]
    }

    pub fn is_finite(&self) -> bool {
        self.lower.is_finite() && self.mode.is_finite() && self.upper.is_finite()
    }
}

pub struct ParameterEstimator<'a> {
    params: &'a ClusterParameters,
}

impl<'a> ParameterEstimator<'a> {
    pub fn new(params: &'a ClusterParameters) -> Self {
        ParameterEstimator { params }
    }

    /// One estimate per cluster that received at least one draw, in label order.
    pub fn components(
        &self,
        labeling: &ClusterLabeling,
        membership: &MembershipIndicator,
    ) -> Result<Vec<ComponentEstimate>> {
        let max_membership = membership.max_per_cluster();
        let mut estimates = Vec::with_capacity(labeling.n_clusters);
        for label in 0..labeling.n_clusters {
            let ws = labeling.cluster_weights(label);
            let rs = labeling.cluster_rates(label);
            if ws.is_empty() {
                continue;
            }
            let best = max_membership.get(label).copied().unwrap_or(0.);
            estimates.push(ComponentEstimate {
                label,
                nb_samples: ws.len(),
                weight: density_mode(&ws, self.params.nbins)?,
                rate: density_mode(&rs, self.params.nbins)?,
                weight_interval: confidence_interval(&ws, self.params.ci_percentage)?,
                rate_interval: confidence_interval(&rs, self.params.ci_percentage)?,
                max_membership: best,
                is_noise: best < self.params.noise_cutoff,
            });
        }
        Ok(estimates)
    }

    /// The non-noise cluster with the smallest rate mode
    pub fn dominant<'c>(&self, components: &'c [ComponentEstimate]) -> Result<&'c ComponentEstimate> {
        components
            .iter()
            .filter(|c| !c.is_noise)
            .min_by(|a, b| a.rate.total_cmp(&b.rate).then(a.label.cmp(&b.label)))
            .ok_or_else(|| {
                RtaError::degenerate(format!(
                    "all {} clusters are noise (max membership < {})",
                    components.len(),
                    self.params.noise_cutoff
                ))
                .into()
            })
    }

    /// τ = 1 / rate over the draws of the dominant cluster: percentile interval
    /// on τ itself, mode of the log-spaced histogram restricted to that interval.
    pub fn tau(
        &self,
        labeling: &ClusterLabeling,
        components: &[ComponentEstimate],
    ) -> Result<TauEstimate> {
        let dominant = self.dominant(components)?;
        let taus: Vec<f64> = labeling
            .cluster_rates(dominant.label)
            .iter()
            .map(|r| 1. / r)
            .collect();
        let (lower, upper) = confidence_interval(&taus, self.params.ci_percentage)?;
        let mut inside: Vec<f64> = taus
            .iter()
            .copied()
            .filter(|&t| t > lower && t < upper)
            .collect();
        if inside.is_empty() {
            // small samples: keep the bounds themselves
            inside = taus
                .iter()
                .copied()
                .filter(|&t| t >= lower && t <= upper)
                .collect();
        }
        let (min, max) = min_max(&inside)?;
        let mode = if min == max {
            min
        } else {
            let edges = log_bins(min, max, self.params.nbins)?;
            let counts = histogram(&taus, &edges);
            let imax = argmax_first(&counts).unwrap_or(0);
            0.5 * (edges[imax] + edges[imax + 1])
        };
        let estimate = TauEstimate { lower, mode, upper };
        if !estimate.is_finite() {
            return Err(RtaError::Numerical(format!("non-finite tau {:?}", estimate)).into());
        }
        Ok(estimate)
    }
}
