//! Conjugate posterior draws used by the Gibbs sampler.
//! All of them take the random generator explicitly.
use crate::shared::errors::RtaError;
use anyhow::{anyhow, Result};
use ndarray::{Array1, ArrayView1};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Dirichlet, Distribution, Gamma};

/// Draw one vector of weights from Dirichlet(alpha).
pub fn sample_dirichlet<R: Rng>(alpha: ArrayView1<f64>, rng: &mut R) -> Result<Array1<f64>> {
    if alpha.iter().any(|&a| !(a > 0.) || !a.is_finite()) {
        return Err(RtaError::Numerical(format!("invalid Dirichlet concentration {}", alpha)).into());
    }
    // a single component always gets the whole mass
    if alpha.len() == 1 {
        return Ok(Array1::ones(1));
    }
    let dirichlet = Dirichlet::new(alpha.as_slice().ok_or(anyhow!("Non-contiguous array"))?)
        .map_err(|e| anyhow!(format!("Error when creating distribution: {}", e)))?;
    let draw = Array1::from(dirichlet.sample(rng));
    let total = draw.sum();
    if !(total > 0.) {
        return Err(RtaError::Numerical("Dirichlet draw with zero mass".to_string()).into());
    }
    // the sampler already normalizes, renormalize to absorb rounding
    Ok(draw / total)
}

/// Draw one rate from Gamma(shape, rate), i.e. scale = 1 / rate.
pub fn sample_gamma<R: Rng>(shape: f64, rate: f64, rng: &mut R) -> Result<f64> {
    let gamma = Gamma::new(shape, 1. / rate).map_err(|e| {
        RtaError::Numerical(format!(
            "Error when creating Gamma({}, {}): {}",
            shape, rate, e
        ))
    })?;
    Ok(gamma.sample(rng))
}

/// Draw an index with probability proportional to `probas`.
/// Zero-probability entries are never returned, all-zero weights give a flat draw.
pub fn sample_categorical<R: Rng>(probas: ArrayView1<f64>, rng: &mut R) -> Result<usize> {
    if !probas.iter().all(|&x| x >= 0.) {
        return Err(anyhow!(
            "Error when creating distribution: negative or invalid weights"
        ));
    }
    let distribution = match probas.sum().abs() < 1e-10 {
        // when all the values are 0, all the values are equiprobable
        true => WeightedIndex::new(vec![1.; probas.len()]),
        false => WeightedIndex::new(probas.iter()),
    }
    .map_err(|e| anyhow!(format!("Error when creating distribution: {}", e)))?;
    Ok(distribution.sample(rng))
}

/// Normalized responsibilities of a mixture of exponentials for one duration:
/// p_k ∝ w_k λ_k exp(-λ_k t), computed in log space.
pub fn exponential_responsibilities(
    log_weights: ArrayView1<f64>,
    rates: ArrayView1<f64>,
    duration: f64,
    out: &mut Array1<f64>,
) {
    let mut max = f64::NEG_INFINITY;
    for k in 0..rates.len() {
        let v = log_weights[k] + rates[k].ln() - rates[k] * duration;
        out[k] = v;
        if v > max {
            max = v;
        }
    }
    if max == f64::NEG_INFINITY {
        // every component has vanished, fall back on a flat assignment
        out.fill(1. / rates.len() as f64);
        return;
    }
    out.mapv_inplace(|v| (v - max).exp());
    let total = out.sum();
    out.mapv_inplace(|v| v / total);
}
