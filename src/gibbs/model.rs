use crate::cluster::{ClusterLabeling, MembershipIndicator, PosteriorClusterer};
use crate::estimate::{ComponentEstimate, ParameterEstimator, TauEstimate};
use crate::gibbs::sampler::{validate_times, Hyperparameters, MixtureGibbsSampler};
use crate::gibbs::trace::PosteriorTrace;
use crate::shared::errors::RtaError;
use crate::shared::parameters::{ClusterParameters, GibbsParameters};
use crate::survival::SurvivalFunction;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Output of the clustering and estimation of one trace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResults {
    pub cluster_params: ClusterParameters,
    pub labeling: ClusterLabeling,
    pub membership: MembershipIndicator,
    pub components: Vec<ComponentEstimate>,
    // None when no cluster survives the noise filter
    pub tau: Option<TauEstimate>,
}

/// Everything known about one residue: data, sampler settings, posterior
/// trace and (once processed) the estimates. This is the persisted artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gibbs {
    pub residue: String,
    pub times: Vec<f64>,
    pub params: GibbsParameters,
    pub hyperparameters: Hyperparameters,
    pub trace: PosteriorTrace,
    #[serde(default)]
    pub survival: Option<SurvivalFunction>,
    #[serde(default)]
    pub processed: Option<ProcessedResults>,
}

impl Gibbs {
    /// Sample the posterior of one residue.
    pub fn run<R: Rng>(
        residue: &str,
        times: Vec<f64>,
        params: &GibbsParameters,
        rng: &mut R,
    ) -> Result<Gibbs> {
        params.validate()?;
        validate_times(&times)?;
        let survival = SurvivalFunction::new(&times)?;
        let sampler = MixtureGibbsSampler::new(&times, params.ncomp)?;
        let hyperparameters = sampler.hyperparameters().clone();
        let trace = sampler.run(params, rng)?;
        Ok(Gibbs {
            residue: residue.to_string(),
            times,
            params: params.clone(),
            hyperparameters,
            trace,
            survival: Some(survival),
            processed: None,
        })
    }

    pub fn nb_events(&self) -> usize {
        self.times.len()
    }

    /// Cluster the post burn-in draws and estimate every component.
    /// Deterministic for a given trace and `cluster_params`.
    pub fn process(&mut self, cluster_params: &ClusterParameters) -> Result<&ProcessedResults> {
        cluster_params.validate()?;
        // artifacts saved without indicator get one from the clustering seed
        let mut rng = SmallRng::seed_from_u64(cluster_params.seed);
        self.trace.ensure_indicator(&self.times, &mut rng)?;

        let view = self.trace.after_burnin();
        let (labeling, membership) =
            PosteriorClusterer::new(cluster_params).cluster(&view, self.nb_events(), self.trace.g)?;
        let estimator = ParameterEstimator::new(cluster_params);
        let components = estimator.components(&labeling, &membership)?;
        let tau = match estimator.tau(&labeling, &components) {
            Ok(t) => Some(t),
            Err(e) if is_degenerate(&e) => {
                warn!("{}: {}", self.residue, e);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(&*self.processed.insert(ProcessedResults {
            cluster_params: cluster_params.clone(),
            labeling,
            membership,
            components,
            tau,
        }))
    }

    /// Recompute the component estimates from the stored labeling.
    pub fn reestimate(&self) -> Result<Vec<ComponentEstimate>> {
        let processed = self.processed()?;
        ParameterEstimator::new(&processed.cluster_params)
            .components(&processed.labeling, &processed.membership)
    }

    pub fn processed(&self) -> Result<&ProcessedResults> {
        self.processed
            .as_ref()
            .ok_or(anyhow!("Residue {} has not been processed", self.residue))
    }

    /// Dominant residence time, DegenerateClustering if every cluster is noise.
    pub fn tau(&self) -> Result<TauEstimate> {
        let processed = self.processed()?;
        processed.tau.ok_or_else(|| {
            RtaError::degenerate(format!("no non-noise cluster for {}", self.residue)).into()
        })
    }

    /// Process on demand, then return the residence time
    pub fn estimate_tau(&mut self, cluster_params: &ClusterParameters) -> Result<TauEstimate> {
        if self.processed.is_none() {
            self.process(cluster_params)?;
        }
        self.tau()
    }

    pub fn artifact_path(root: &Path, residue: &str, niter: usize) -> PathBuf {
        root.join(residue).join(format!("gibbs_{}.json", niter))
    }

    /// Write `root/<residue>/gibbs_<niter>.json`, an existing artifact is
    /// renamed to `.bak` first.
    pub fn save(&self, root: &Path) -> Result<PathBuf> {
        let path = Self::artifact_path(root, &self.residue, self.params.niter);
        let dir = path
            .parent()
            .ok_or(anyhow!("Invalid artifact path {}", path.display()))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Error creating the directory {}", dir.display()))?;
        if path.exists() {
            let mut backup = path.clone().into_os_string();
            backup.push(".bak");
            fs::rename(&path, &backup)
                .with_context(|| format!("Error backing up {}", path.display()))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Error creating the file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!("saved {}", path.display());
        Ok(path)
    }

    /// Read an artifact back. The survival function is recomputed when the
    /// file does not contain it.
    pub fn load(path: &Path) -> Result<Gibbs> {
        if !path.exists() {
            return Err(RtaError::MissingResult(path.to_path_buf()).into());
        }
        let file = File::open(path)
            .with_context(|| format!("Error opening the file {}", path.display()))?;
        let mut gibbs: Gibbs = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| RtaError::corrupt(path, e.to_string()))?;

        gibbs
            .trace
            .check()
            .map_err(|e| RtaError::corrupt(path, e.to_string()))?;
        if gibbs.trace.ncomp != gibbs.params.ncomp {
            return Err(RtaError::corrupt(path, "component count differs from the parameters").into());
        }
        let indicator = gibbs.trace.indicator.dim();
        if indicator != (0, 0) && !gibbs.trace.has_indicator(gibbs.nb_events()) {
            return Err(RtaError::corrupt(
                path,
                format!(
                    "indicator of shape {:?} for {} events",
                    indicator,
                    gibbs.nb_events()
                ),
            )
            .into());
        }
        if gibbs.survival.is_none() {
            gibbs.survival = Some(
                SurvivalFunction::new(&gibbs.times)
                    .map_err(|e| RtaError::corrupt(path, e.to_string()))?,
            );
        }
        Ok(gibbs)
    }
}

pub fn is_degenerate(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<RtaError>(),
        Some(RtaError::DegenerateClustering(_))
    )
}
