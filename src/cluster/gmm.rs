//! Gaussian mixture model on two-dimensional points (full covariances),
//! fitted by expectation maximization from several k-means++ starts.
use crate::shared::errors::RtaError;
use anyhow::Result;
use log::debug;
use nalgebra::{Matrix2, Vector2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const LLOYD_ITERATIONS: usize = 20;

#[derive(Clone, Debug)]
pub struct GmmSettings {
    pub n_components: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub reg_covar: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianMixture {
    pub weights: Vec<f64>,
    pub means: Vec<Vector2<f64>>,
    pub covariances: Vec<Matrix2<f64>>,
    // mean log-likelihood per point of the retained fit
    pub lower_bound: f64,
    pub converged: bool,
}

// Precomputed quantities for the log-density of one component
struct Precision {
    inverse: Matrix2<f64>,
    log_norm: f64,
}

fn precision(cov: &Matrix2<f64>) -> Result<Precision> {
    let det = cov.determinant();
    let inverse = cov
        .try_inverse()
        .filter(|_| det > 0. && det.is_finite())
        .ok_or_else(|| {
            RtaError::Numerical(format!("singular covariance matrix (det = {})", det))
        })?;
    Ok(Precision {
        inverse,
        log_norm: -(2. * PI).ln() - 0.5 * det.ln(),
    })
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

impl GaussianMixture {
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Best of `n_init` EM runs (largest lower bound)
    pub fn fit<R: Rng>(
        data: &[Vector2<f64>],
        settings: &GmmSettings,
        rng: &mut R,
    ) -> Result<GaussianMixture> {
        let k = settings.n_components;
        if k == 0 {
            return Err(RtaError::degenerate("a mixture needs at least one component").into());
        }
        if data.len() < k {
            return Err(RtaError::degenerate(format!(
                "{} points cannot be split into {} clusters",
                data.len(),
                k
            ))
            .into());
        }

        let mut best: Option<GaussianMixture> = None;
        for _ in 0..settings.n_init.max(1) {
            let candidate = Self::fit_once(data, settings, rng)?;
            if best
                .as_ref()
                .map_or(true, |b| candidate.lower_bound > b.lower_bound)
            {
                best = Some(candidate);
            }
        }
        let best = best.ok_or_else(|| RtaError::degenerate("no mixture fitted"))?;
        if !best.converged {
            debug!(
                "Gaussian mixture did not converge after {} iterations",
                settings.max_iter
            );
        }
        Ok(best)
    }

    fn fit_once<R: Rng>(
        data: &[Vector2<f64>],
        settings: &GmmSettings,
        rng: &mut R,
    ) -> Result<GaussianMixture> {
        let labels = kmeans_labels(data, settings.n_components, rng);
        let hard: Vec<Vec<f64>> = labels
            .iter()
            .map(|&l| {
                let mut r = vec![0.; settings.n_components];
                r[l] = 1.;
                r
            })
            .collect();
        let mut model = Self::m_step(data, &hard, settings.reg_covar);

        let mut lower_bound = f64::NEG_INFINITY;
        let mut converged = false;
        for _ in 0..settings.max_iter {
            let previous = lower_bound;
            let (resp, lb) = model.e_step(data)?;
            lower_bound = lb;
            model = Self::m_step(data, &resp, settings.reg_covar);
            if (lower_bound - previous).abs() < settings.tol {
                converged = true;
                break;
            }
        }
        // final lower bound of the returned parameters
        let (_, lb) = model.e_step(data)?;
        model.lower_bound = lb;
        model.converged = converged;
        Ok(model)
    }

    fn weighted_log_probs(&self, x: &Vector2<f64>, precisions: &[Precision], out: &mut [f64]) {
        for (j, p) in precisions.iter().enumerate() {
            let d = x - self.means[j];
            let mahalanobis = (d.transpose() * p.inverse * d)[(0, 0)];
            out[j] = self.weights[j].ln() + p.log_norm - 0.5 * mahalanobis;
        }
    }

    fn precisions(&self) -> Result<Vec<Precision>> {
        self.covariances.iter().map(precision).collect()
    }

    /// Responsibilities and mean log-likelihood
    fn e_step(&self, data: &[Vector2<f64>]) -> Result<(Vec<Vec<f64>>, f64)> {
        let precisions = self.precisions()?;
        let k = self.n_components();
        let mut total = 0.;
        let mut resp = Vec::with_capacity(data.len());
        let mut buf = vec![0.; k];
        for x in data {
            self.weighted_log_probs(x, &precisions, &mut buf);
            let norm = log_sum_exp(&buf);
            total += norm;
            resp.push(buf.iter().map(|v| (v - norm).exp()).collect());
        }
        Ok((resp, total / data.len() as f64))
    }

    fn m_step(data: &[Vector2<f64>], resp: &[Vec<f64>], reg_covar: f64) -> GaussianMixture {
        let k = resp.first().map_or(0, |r| r.len());
        let n = data.len() as f64;
        let mut nk = vec![10. * f64::EPSILON; k];
        let mut means = vec![Vector2::zeros(); k];
        for (x, r) in data.iter().zip(resp) {
            for j in 0..k {
                nk[j] += r[j];
                means[j] += r[j] * x;
            }
        }
        for j in 0..k {
            means[j] /= nk[j];
        }
        let mut covariances = vec![Matrix2::zeros(); k];
        for (x, r) in data.iter().zip(resp) {
            for j in 0..k {
                let d = x - means[j];
                covariances[j] += r[j] * d * d.transpose();
            }
        }
        for j in 0..k {
            covariances[j] = covariances[j] / nk[j] + Matrix2::identity() * reg_covar;
        }
        GaussianMixture {
            weights: nk.iter().map(|w| w / n).collect(),
            means,
            covariances,
            lower_bound: f64::NEG_INFINITY,
            converged: false,
        }
    }

    /// Most likely component of one point
    pub fn predict_one(&self, x: &Vector2<f64>) -> Result<usize> {
        Ok(self.predict(std::slice::from_ref(x))?[0])
    }

    pub fn predict(&self, data: &[Vector2<f64>]) -> Result<Vec<usize>> {
        let precisions = self.precisions()?;
        let mut buf = vec![0.; self.n_components()];
        Ok(data
            .iter()
            .map(|x| {
                self.weighted_log_probs(x, &precisions, &mut buf);
                buf.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                        if v > bv {
                            (i, v)
                        } else {
                            (bi, bv)
                        }
                    })
                    .0
            })
            .collect())
    }
}

/// k-means++ seeding followed by a few Lloyd iterations
fn kmeans_labels<R: Rng>(data: &[Vector2<f64>], k: usize, rng: &mut R) -> Vec<usize> {
    let mut centers: Vec<Vector2<f64>> = Vec::with_capacity(k);
    centers.push(data[rng.gen_range(0..data.len())]);
    let mut dist: Vec<f64> = data.iter().map(|x| (x - centers[0]).norm_squared()).collect();
    while centers.len() < k {
        let total: f64 = dist.iter().sum();
        let next = if total > 0. {
            let u = rng.gen::<f64>() * total;
            let mut acc = 0.;
            dist.iter()
                .position(|&d| {
                    acc += d;
                    acc > u
                })
                .unwrap_or(data.len() - 1)
        } else {
            // every point sits on a center already
            rng.gen_range(0..data.len())
        };
        centers.push(data[next]);
        for (d, x) in dist.iter_mut().zip(data) {
            *d = (*d).min((x - data[next]).norm_squared());
        }
    }

    let mut labels = vec![0; data.len()];
    for _ in 0..LLOYD_ITERATIONS {
        let mut changed = false;
        for (l, x) in labels.iter_mut().zip(data) {
            let nearest = nearest_center(x, &centers);
            if nearest != *l {
                *l = nearest;
                changed = true;
            }
        }
        let mut sums = vec![Vector2::zeros(); k];
        let mut counts = vec![0usize; k];
        for (&l, x) in labels.iter().zip(data) {
            sums[l] += x;
            counts[l] += 1;
        }
        for j in 0..k {
            if counts[j] > 0 {
                centers[j] = sums[j] / counts[j] as f64;
            }
        }
        if !changed {
            break;
        }
    }
    labels
}

fn nearest_center(x: &Vector2<f64>, centers: &[Vector2<f64>]) -> usize {
    centers
        .iter()
        .enumerate()
        .map(|(j, c)| (j, (x - c).norm_squared()))
        .fold((0, f64::INFINITY), |(bj, bd), (j, d)| {
            if d < bd {
                (j, d)
            } else {
                (bj, bd)
            }
        })
        .0
}
