use crate::gibbs::trace::PosteriorTrace;
use crate::shared::distributions::{
    exponential_responsibilities, sample_categorical, sample_dirichlet, sample_gamma,
};
use crate::shared::errors::RtaError;
use crate::shared::parameters::{GibbsParameters, MAX_COMPONENTS};
use anyhow::Result;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Weights and rates of the exponential components at one iteration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixtureState {
    pub weights: Array1<f64>,
    pub rates: Array1<f64>,
}

impl MixtureState {
    /// Deterministic starting point: rates on a logarithmic grid
    /// (5, 0.5, 0.05, ...) and weights decaying by a factor 10 per component,
    /// so that the fastest components start with most of the mass.
    pub fn initial(ncomp: usize) -> MixtureState {
        let n = ncomp as i32;
        // 0.5 * 10^(-ncomp+2 .. 2), reversed
        let rates: Array1<f64> = (-n + 2..2)
            .rev()
            .map(|p| 0.5 * 10f64.powi(p))
            .collect();
        let raw: Array1<f64> = (1..=n).map(|p| 9. * 10f64.powi(-p)).collect();
        let weights = &raw / raw.sum();
        MixtureState { weights, rates }
    }

    pub fn ncomp(&self) -> usize {
        self.weights.len()
    }
}

/// Conjugate priors: Dirichlet on the weights, Gamma(shape, rate) on each rate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub weight_concentration: Array1<f64>,
    pub rate_shape: Array1<f64>,
    pub rate_rate: Array1<f64>,
}

impl Hyperparameters {
    pub fn new(ncomp: usize) -> Hyperparameters {
        Hyperparameters {
            weight_concentration: Array1::from_elem(ncomp, 1. / ncomp as f64),
            rate_shape: Array1::ones(ncomp),
            rate_rate: Array1::from_elem(ncomp, 3.),
        }
    }
}

/// Gibbs sampler for a mixture of exponentials on the durations of one
/// residue. The chain is strictly sequential.
pub struct MixtureGibbsSampler<'a> {
    times: &'a [f64],
    hypers: Hyperparameters,
    state: MixtureState,
    indicator: Vec<u8>,
    // per-component number of events (N_k) and total time (T_k)
    counts: Array1<f64>,
    total_times: Array1<f64>,
    // scratch buffer for the responsibilities of one event
    probas: Array1<f64>,
}

/// Check that the durations can be fitted
pub fn validate_times(times: &[f64]) -> Result<()> {
    if times.is_empty() {
        return Err(RtaError::invalid("no event durations").into());
    }
    if let Some(t) = times.iter().find(|t| !(**t > 0.) || !t.is_finite()) {
        return Err(RtaError::invalid(format!(
            "event durations must be positive and finite, found {}",
            t
        ))
        .into());
    }
    Ok(())
}

impl<'a> MixtureGibbsSampler<'a> {
    pub fn new(times: &'a [f64], ncomp: usize) -> Result<MixtureGibbsSampler<'a>> {
        validate_times(times)?;
        if ncomp == 0 || ncomp > MAX_COMPONENTS {
            return Err(RtaError::invalid(format!(
                "the number of components must lie in [1, {}], got {}",
                MAX_COMPONENTS, ncomp
            ))
            .into());
        }
        Ok(MixtureGibbsSampler {
            times,
            hypers: Hyperparameters::new(ncomp),
            state: MixtureState::initial(ncomp),
            indicator: vec![0; times.len()],
            counts: Array1::zeros(ncomp),
            total_times: Array1::zeros(ncomp),
            probas: Array1::zeros(ncomp),
        })
    }

    pub fn state(&self) -> &MixtureState {
        &self.state
    }

    pub fn indicator(&self) -> &[u8] {
        &self.indicator
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hypers
    }

    /// Number of events assigned to each component at the last step
    pub fn counts(&self) -> &Array1<f64> {
        &self.counts
    }

    /// One full sweep: assignments, then weights, then rates.
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let ncomp = self.state.ncomp();
        let log_weights = self.state.weights.mapv(f64::ln);

        self.counts.fill(0.);
        self.total_times.fill(0.);
        for (i, &t) in self.times.iter().enumerate() {
            exponential_responsibilities(
                log_weights.view(),
                self.state.rates.view(),
                t,
                &mut self.probas,
            );
            let k = sample_categorical(self.probas.view(), rng)?;
            self.indicator[i] = k as u8;
            self.counts[k] += 1.;
            self.total_times[k] += t;
        }

        self.state.weights =
            sample_dirichlet((&self.hypers.weight_concentration + &self.counts).view(), rng)?;
        for k in 0..ncomp {
            self.state.rates[k] = sample_gamma(
                self.hypers.rate_shape[k] + self.counts[k],
                self.hypers.rate_rate[k] + self.total_times[k],
                rng,
            )?;
        }
        Ok(())
    }

    /// Run the chain for iterations 0..=niter and keep every g-th state.
    pub fn run<R: Rng>(mut self, params: &GibbsParameters, rng: &mut R) -> Result<PosteriorTrace> {
        params.validate()?;
        if params.ncomp != self.state.ncomp() {
            return Err(RtaError::invalid(format!(
                "sampler built with {} components, parameters ask for {}",
                self.state.ncomp(),
                params.ncomp
            ))
            .into());
        }
        let nb_saved = params.nb_saved();
        let mut weights = Array2::<f64>::zeros((nb_saved, params.ncomp));
        let mut rates = Array2::<f64>::zeros((nb_saved, params.ncomp));
        let mut indicator = Array2::<u8>::zeros((nb_saved, self.times.len()));

        for j in 0..=params.niter {
            self.step(rng)?;
            if j % params.g == 0 {
                let row = j / params.g;
                weights.row_mut(row).assign(&self.state.weights);
                rates.row_mut(row).assign(&self.state.rates);
                indicator
                    .row_mut(row)
                    .assign(&ArrayView1::from(self.indicator.as_slice()));
            }
            if j > 0 && j % 10000 == 0 {
                debug!("Gibbs iteration {}/{}", j, params.niter);
            }
        }

        Ok(PosteriorTrace {
            ncomp: params.ncomp,
            g: params.g,
            burnin: params.burnin,
            weights,
            rates,
            indicator,
        })
    }
}
