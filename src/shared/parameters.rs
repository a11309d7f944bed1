//! The structs used for specifying the parameters of the sampler and of the
//! post-processing
use crate::shared::errors::RtaError;
use anyhow::{Context, Result};
#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Largest number of mixture components (indicators are stored as `u8`)
pub const MAX_COMPONENTS: usize = 256;

#[cfg_attr(all(feature = "py_binds", feature = "pyo3"), pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GibbsParameters {
    // Number of exponential components of the mixture
    pub ncomp: usize,
    // Total number of Gibbs iterations
    pub niter: usize,
    // Thinning: the state is saved every `g` iterations
    pub g: usize,
    // Iterations excluded from the estimation
    pub burnin: usize,
    // Base seed of the per-residue random generator. `None` draws from entropy.
    pub seed: Option<u64>,
}

#[cfg_attr(all(feature = "py_binds", feature = "pyo3"), pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterParameters {
    // A component is significant when its weight is above min_support / N,
    // i.e. it explains on average at least `min_support` events
    pub min_support: f64,
    // A cluster whose best per-event membership is below this value is noise
    pub noise_cutoff: f64,
    // Number of log-spaced bins used for the density modes
    pub nbins: usize,
    // Width of the percentile interval, in percent
    pub ci_percentage: f64,
    // Gaussian mixture: number of restarts, EM iterations, tolerance
    // on the lower bound and covariance regularisation
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub reg_covar: f64,
    // Seed of the clustering random generator (k-means++ seeding)
    pub seed: u64,
}

/// Everything needed to run a full protein
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub gibbs: GibbsParameters,
    #[serde(default)]
    pub cluster: ClusterParameters,
    #[serde(default = "default_nproc")]
    pub nproc: usize,
}

fn default_nproc() -> usize {
    1
}

impl Default for GibbsParameters {
    fn default() -> GibbsParameters {
        GibbsParameters {
            ncomp: 15,
            niter: 50000,
            g: 100,
            burnin: 10000,
            seed: None,
        }
    }
}

impl Default for ClusterParameters {
    fn default() -> ClusterParameters {
        ClusterParameters {
            min_support: 10.,
            noise_cutoff: 0.4,
            nbins: 20,
            ci_percentage: 95.,
            n_init: 117,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            seed: 0,
        }
    }
}

impl GibbsParameters {
    pub fn new(ncomp: usize, niter: usize, g: usize, burnin: usize) -> Self {
        Self {
            ncomp,
            niter,
            g,
            burnin,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject settings the chain cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ncomp == 0 {
            return Err(RtaError::invalid("the number of components must be positive").into());
        }
        if self.ncomp > MAX_COMPONENTS {
            return Err(RtaError::invalid(format!(
                "at most {} components are supported, got {}",
                MAX_COMPONENTS, self.ncomp
            ))
            .into());
        }
        if self.niter == 0 {
            return Err(RtaError::invalid("the number of iterations must be positive").into());
        }
        if self.g == 0 {
            return Err(RtaError::invalid("the thinning interval must be positive").into());
        }
        if self.burnin >= self.niter {
            return Err(RtaError::invalid(format!(
                "burn-in ({}) must be smaller than the number of iterations ({})",
                self.burnin, self.niter
            ))
            .into());
        }
        Ok(())
    }

    /// Number of rows of the saved trace
    pub fn nb_saved(&self) -> usize {
        self.niter / self.g + 1
    }

    /// First saved row that is not burn-in
    pub fn burnin_index(&self) -> usize {
        self.burnin / self.g
    }
}

impl ClusterParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_support > 0.) {
            return Err(RtaError::invalid("min_support must be positive").into());
        }
        if !(0. ..=1.).contains(&self.noise_cutoff) {
            return Err(RtaError::invalid("noise_cutoff must lie in [0, 1]").into());
        }
        if self.nbins == 0 {
            return Err(RtaError::invalid("nbins must be positive").into());
        }
        if !(self.ci_percentage > 0. && self.ci_percentage < 100.) {
            return Err(RtaError::invalid("ci_percentage must lie in (0, 100)").into());
        }
        if self.n_init == 0 || self.max_iter == 0 {
            return Err(RtaError::invalid("n_init and max_iter must be positive").into());
        }
        Ok(())
    }

    /// Significance cutoff on the weights for a residue with `nb_events` events
    pub fn weight_cutoff(&self, nb_events: usize) -> f64 {
        self.min_support / nb_events as f64
    }
}

impl RunConfig {
    pub fn load_json(path: &Path) -> Result<RunConfig> {
        let file = File::open(path)
            .with_context(|| format!("Error opening the configuration {}", path.display()))?;
        let config: RunConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Error parsing the configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.gibbs.validate()?;
        self.cluster.validate()?;
        if self.nproc == 0 {
            return Err(RtaError::invalid("nproc must be positive").into());
        }
        Ok(())
    }
}

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pymethods]
impl GibbsParameters {
    #[new]
    pub fn py_new() -> Self {
        GibbsParameters::default()
    }

    fn __repr__(&self) -> PyResult<String> {
        Ok(format!(
            "GibbsParameters(ncomp={}, niter={}, g={}, burnin={}, seed={:?})",
            self.ncomp, self.niter, self.g, self.burnin, self.seed
        ))
    }

    fn __str__(&self) -> PyResult<String> {
        self.__repr__()
    }
}

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pymethods]
impl ClusterParameters {
    #[new]
    pub fn py_new() -> Self {
        ClusterParameters::default()
    }

    fn __repr__(&self) -> PyResult<String> {
        Ok(format!(
            "ClusterParameters(min_support={}, noise_cutoff={}, nbins={}, ci_percentage={}, n_init={})",
            self.min_support, self.noise_cutoff, self.nbins, self.ci_percentage, self.n_init
        ))
    }

    fn __str__(&self) -> PyResult<String> {
        self.__repr__()
    }
}
