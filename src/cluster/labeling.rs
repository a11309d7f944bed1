use crate::cluster::gmm::{GaussianMixture, GmmSettings};
use crate::gibbs::trace::TraceView;
use crate::shared::parameters::ClusterParameters;
use crate::shared::utils::smallest_mode;
use anyhow::Result;
use itertools::Itertools;
use log::{debug, warn};
use nalgebra::Vector2;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Every significant (weight, rate) draw of the post burn-in trace, with the
/// global cluster it was assigned to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterLabeling {
    // modal number of significant components (lmode), = number of clusters
    pub n_clusters: usize,
    pub weights: Vec<f64>,
    pub rates: Vec<f64>,
    // saved row (in the full trace) and component index of each draw
    pub rows: Vec<usize>,
    pub components: Vec<usize>,
    pub iterations: Vec<usize>,
    pub labels: Vec<usize>,
    // permutation[new_label] = label given by the mixture fit
    pub permutation: Vec<usize>,
    // mixture fitted in log space, absent for the single catch-all bucket
    pub mixture: Option<GaussianMixture>,
}

/// Soft membership of each event (rows) to each cluster (columns).
/// Rows sum to one, or to zero for events never assigned to a significant
/// component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MembershipIndicator {
    pub probabilities: Array2<f64>,
}

impl ClusterLabeling {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Weights of the draws of cluster `label`
    pub fn cluster_weights(&self, label: usize) -> Vec<f64> {
        self.select(label, &self.weights)
    }

    pub fn cluster_rates(&self, label: usize) -> Vec<f64> {
        self.select(label, &self.rates)
    }

    fn select(&self, label: usize, values: &[f64]) -> Vec<f64> {
        self.labels
            .iter()
            .zip(values)
            .filter(|(&l, _)| l == label)
            .map(|(_, &v)| v)
            .collect()
    }
}

impl MembershipIndicator {
    /// Largest membership of any event in each cluster
    pub fn max_per_cluster(&self) -> Vec<f64> {
        self.probabilities
            .columns()
            .into_iter()
            .map(|c| c.iter().copied().fold(0., f64::max))
            .collect()
    }
}

pub struct PosteriorClusterer<'a> {
    params: &'a ClusterParameters,
}

impl<'a> PosteriorClusterer<'a> {
    pub fn new(params: &'a ClusterParameters) -> Self {
        PosteriorClusterer { params }
    }

    /// Cluster the significant draws of `view` into the modal number of
    /// components, then accumulate the event memberships.
    pub fn cluster(
        &self,
        view: &TraceView,
        nb_events: usize,
        g: usize,
    ) -> Result<(ClusterLabeling, MembershipIndicator)> {
        let cutoff = self.params.weight_cutoff(nb_events);
        let counts = view.significant_counts(cutoff);
        let lmode = smallest_mode(&counts).unwrap_or(0);
        debug!(
            "significant components: min {:?}, mode {}, max {:?}",
            counts.iter().min(),
            lmode,
            counts.iter().max()
        );

        // all significant draws, row by row
        let mut weights = Vec::new();
        let mut rates = Vec::new();
        let mut rows = Vec::new();
        let mut components = Vec::new();
        for row in 0..view.nb_rows() {
            for k in view.significant(row, cutoff) {
                weights.push(view.weights[[row, k]]);
                rates.push(view.rates[[row, k]]);
                rows.push(row);
                components.push(k);
            }
        }

        let (n_clusters, labels, permutation, mixture) = if lmode == 0 || weights.is_empty() {
            if !weights.is_empty() {
                warn!("modal number of significant components is 0, using a single cluster");
            }
            (1, vec![0; weights.len()], vec![0], None)
        } else {
            // train on the rows that have exactly lmode significant components
            let train: Vec<Vector2<f64>> = (0..weights.len())
                .filter(|&i| counts[rows[i]] == lmode)
                .map(|i| Vector2::new(weights[i].ln(), rates[i].ln()))
                .collect();
            let settings = GmmSettings {
                n_components: lmode,
                n_init: self.params.n_init,
                max_iter: self.params.max_iter,
                tol: self.params.tol,
                reg_covar: self.params.reg_covar,
            };
            let mut rng = SmallRng::seed_from_u64(self.params.seed);
            let mixture = GaussianMixture::fit(&train, &settings, &mut rng)?;

            let all: Vec<Vector2<f64>> = weights
                .iter()
                .zip(&rates)
                .map(|(w, r)| Vector2::new(w.ln(), r.ln()))
                .collect();
            let raw_labels = mixture.predict(&all)?;

            // slowest process (smallest mean log-rate) first
            let permutation: Vec<usize> = (0..lmode)
                .sorted_by(|&a, &b| {
                    mixture.means[a][1]
                        .total_cmp(&mixture.means[b][1])
                        .then(a.cmp(&b))
                })
                .collect();
            let mut rank = vec![0; lmode];
            for (new, &old) in permutation.iter().enumerate() {
                rank[old] = new;
            }
            let labels = raw_labels.iter().map(|&l| rank[l]).collect();
            (lmode, labels, permutation, Some(mixture))
        };

        let membership = accumulate_membership(view, nb_events, n_clusters, &rows, &components, &labels);
        let iterations = rows.iter().map(|&r| (r + view.first_row) * g).collect();
        let rows = rows.iter().map(|&r| r + view.first_row).collect();

        Ok((
            ClusterLabeling {
                n_clusters,
                weights,
                rates,
                rows,
                components,
                iterations,
                labels,
                permutation,
                mixture,
            },
            membership,
        ))
    }
}

/// For every significant draw (row, component -> label), every event assigned
/// to that component at that row votes for the label.
fn accumulate_membership(
    view: &TraceView,
    nb_events: usize,
    n_clusters: usize,
    rows: &[usize],
    components: &[usize],
    labels: &[usize],
) -> MembershipIndicator {
    let mut probabilities = Array2::<f64>::zeros((nb_events, n_clusters));
    if view.indicator.nrows() == view.nb_rows() && view.indicator.ncols() == nb_events {
        for ((&row, &k), &label) in rows.iter().zip(components).zip(labels) {
            for (i, &assigned) in view.indicator.row(row).iter().enumerate() {
                if assigned as usize == k {
                    probabilities[[i, label]] += 1.;
                }
            }
        }
    }
    for mut event in probabilities.rows_mut() {
        let total = event.sum();
        if total > 0. {
            event /= total;
        }
    }
    MembershipIndicator { probabilities }
}
