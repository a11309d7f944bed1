#![warn(clippy::large_types_passed_by_value)]

pub mod cluster;
pub mod estimate;
pub mod gibbs;
pub mod protein;
pub mod shared;
pub mod survival;

pub use crate::estimate::{ComponentEstimate, ParameterEstimator, TauEstimate};
pub use crate::gibbs::{Gibbs, MixtureGibbsSampler, PosteriorTrace};
pub use crate::protein::{
    ParallelGibbs, ProteinAggregator, ResidueFailure, ResidueInput, ResidueResult,
};
pub use crate::shared::{ClusterParameters, GibbsParameters, RtaError, RunConfig};
pub use crate::survival::SurvivalFunction;

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use anyhow::Result;

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use crate::protein::aggregate::sort_results;

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use kdam::set_notebook;

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use numpy::{IntoPyArray, PyArray1, PyArray2};

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use pyo3::prelude::*;

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use rand::{rngs::SmallRng, SeedableRng};

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use std::path::Path;

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
use std::sync::atomic::{AtomicBool, Ordering};

// progress bars are not shown from notebooks
#[cfg(all(feature = "py_binds", feature = "pyo3"))]
static IN_NOTEBOOK: AtomicBool = AtomicBool::new(false);

/// Run to get notebook-compatible progress bars
#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pyfunction]
fn notebook_mode() {
    set_notebook(true);
    IN_NOTEBOOK.store(true, Ordering::SeqCst);
}

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pyclass(name = "Gibbs")]
#[derive(Debug, Clone)]
pub struct PyGibbs {
    inner: Gibbs,
}

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pymethods]
impl PyGibbs {
    #[staticmethod]
    /// Sample the posterior of one residue
    pub fn run(residue: &str, times: Vec<f64>, params: GibbsParameters) -> Result<PyGibbs> {
        let mut rng = match params.seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_entropy(),
        };
        Ok(PyGibbs {
            inner: Gibbs::run(residue, times, &params, &mut rng)?,
        })
    }

    #[staticmethod]
    pub fn load(path: &str) -> Result<PyGibbs> {
        Ok(PyGibbs {
            inner: Gibbs::load(Path::new(path))?,
        })
    }

    pub fn save(&self, root: &str) -> Result<String> {
        Ok(self.inner.save(Path::new(root))?.display().to_string())
    }

    pub fn process(&mut self, params: ClusterParameters) -> Result<()> {
        self.inner.process(&params)?;
        Ok(())
    }

    /// (lower, mode, upper) of the dominant residence time
    pub fn tau(&self) -> Result<TauEstimate> {
        self.inner.tau()
    }

    #[getter]
    pub fn get_residue(&self) -> String {
        self.inner.residue.clone()
    }

    #[getter]
    pub fn get_weights(&self, py: Python) -> Py<PyArray2<f64>> {
        self.inner.trace.weights.clone().into_pyarray_bound(py).into()
    }

    #[getter]
    pub fn get_rates(&self, py: Python) -> Py<PyArray2<f64>> {
        self.inner.trace.rates.clone().into_pyarray_bound(py).into()
    }

    #[getter]
    pub fn get_indicator(&self, py: Python) -> Py<PyArray2<u8>> {
        self.inner.trace.indicator.clone().into_pyarray_bound(py).into()
    }

    /// (t, s) of the empirical survival function
    #[getter]
    pub fn get_survival(&self, py: Python) -> Option<(Py<PyArray1<f64>>, Py<PyArray1<f64>>)> {
        self.inner.survival.as_ref().map(|sf| {
            (
                sf.t.clone().into_pyarray_bound(py).into(),
                sf.s.clone().into_pyarray_bound(py).into(),
            )
        })
    }
}

/// Run every residue on `config.nproc` threads, returns (residue, lower, mode, upper, status)
#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pyfunction]
#[pyo3(signature = (residues, times, config, output=None))]
fn run_protein(
    residues: Vec<String>,
    times: Vec<Vec<f64>>,
    config: &Bound<'_, PyAny>,
    output: Option<String>,
) -> Result<Vec<(String, f64, f64, f64, String)>> {
    let gibbs: GibbsParameters = config.getattr("gibbs")?.extract()?;
    let cluster: ClusterParameters = config.getattr("cluster")?.extract()?;
    let nproc: usize = config.getattr("nproc")?.extract()?;
    let inputs: Vec<ResidueInput> = residues
        .iter()
        .zip(times)
        .map(|(r, t)| ResidueInput::new(r, t))
        .collect();
    let mut runner = ParallelGibbs::new(RunConfig {
        gibbs,
        cluster,
        nproc,
    })?;
    if IN_NOTEBOOK.load(Ordering::SeqCst) {
        runner = runner.without_progress();
    }
    if let Some(root) = output {
        runner = runner.with_output(Path::new(&root));
    }
    let mut results = runner.run(&inputs)?;
    sort_results(&mut results);
    Ok(report(&results))
}

/// Residence times of all the residues saved under `root`
#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pyfunction]
fn collect_taus(
    root: &str,
    niter: usize,
    params: ClusterParameters,
) -> Result<Vec<(String, f64, f64, f64, String)>> {
    let aggregator = ProteinAggregator::new(Path::new(root), niter);
    Ok(report(&aggregator.collect(&params)?))
}

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
fn report(results: &[ResidueResult]) -> Vec<(String, f64, f64, f64, String)> {
    results
        .iter()
        .map(|r| {
            let t = r.tau();
            (r.residue.clone(), t.lower, t.mode, t.upper, r.status().to_string())
        })
        .collect()
}

#[cfg(all(feature = "py_binds", feature = "pyo3"))]
#[pymodule]
#[pyo3(name = "_restime")]
fn restime_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyGibbs>()?;
    m.add_class::<crate::shared::parameters::GibbsParameters>()?;
    m.add_class::<crate::shared::parameters::ClusterParameters>()?;
    m.add_class::<crate::estimate::TauEstimate>()?;
    m.add_function(wrap_pyfunction!(notebook_mode, m)?)?;
    m.add_function(wrap_pyfunction!(run_protein, m)?)?;
    m.add_function(wrap_pyfunction!(collect_taus, m)?)?;
    Ok(())
}
