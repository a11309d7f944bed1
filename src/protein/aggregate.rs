//! Protein-level view: discover the per-residue artifacts, collect or
//! recompute their residence times and write the reports.
use crate::gibbs::Gibbs;
use crate::protein::parallel::ParallelGibbs;
use crate::protein::results::ResidueResult;
use crate::shared::parameters::ClusterParameters;
use crate::shared::utils::round2;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

static RESIDUE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").unwrap());

/// Numeric suffix of a residue label (`W59` -> 59)
pub fn residue_number(residue: &str) -> Option<u32> {
    RESIDUE_NUMBER
        .captures(residue)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Labels without a number go last, in lexicographic order.
pub fn sort_residues(residues: &mut [String]) {
    residues.sort_by_key(|r| (residue_number(r).is_none(), residue_number(r), r.clone()));
}

/// Two scalar attributes per residue for a structure overlay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureAnnotation {
    pub residue: String,
    pub resid: Option<u32>,
    // tau mode
    pub tempfactor: f64,
    // tau mode over the width of its interval
    pub occupancy: f64,
}

impl StructureAnnotation {
    pub fn new(result: &ResidueResult) -> StructureAnnotation {
        let tau = result.tau();
        let finite_or_zero = |x: f64| if x.is_finite() { x } else { 0. };
        StructureAnnotation {
            residue: result.residue.clone(),
            resid: result.resid,
            tempfactor: finite_or_zero(round2(tau.mode)),
            occupancy: finite_or_zero(round2(tau.mode / (tau.upper - tau.lower))),
        }
    }
}

#[derive(Serialize)]
struct TauRow<'a> {
    residue: &'a str,
    resid: Option<u32>,
    lower: f64,
    mode: f64,
    upper: f64,
    status: &'a str,
}

pub struct ProteinAggregator {
    pub root: PathBuf,
    pub niter: usize,
}

impl ProteinAggregator {
    pub fn new(root: &Path, niter: usize) -> ProteinAggregator {
        ProteinAggregator {
            root: root.to_path_buf(),
            niter,
        }
    }

    pub fn artifact_path(&self, residue: &str) -> PathBuf {
        Gibbs::artifact_path(&self.root, residue, self.niter)
    }

    /// Residue directories under the root, sorted by numeric suffix
    pub fn discover(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Error reading the directory {}", self.root.display()))?;
        let mut residues = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                residues.push(name.to_string());
            }
        }
        sort_residues(&mut residues);
        debug!("found {} residues in {}", residues.len(), self.root.display());
        Ok(residues)
    }

    /// τ of one stored residue, processing the bundle if it never was
    pub fn residue_tau(&self, residue: &str, cluster_params: &ClusterParameters) -> ResidueResult {
        let result = Gibbs::load(&self.artifact_path(residue))
            .and_then(|mut gibbs| gibbs.estimate_tau(cluster_params));
        let result = ResidueResult::from_result(residue, residue_number(residue), result);
        if let Err(failure) = &result.outcome {
            warn!("{}: {}", residue, failure);
        }
        result
    }

    /// Collect every discovered residue; failures become zero triples.
    pub fn collect(&self, cluster_params: &ClusterParameters) -> Result<Vec<ResidueResult>> {
        let residues = self.discover()?;
        Ok(self.collect_residues(&residues, cluster_params))
    }

    /// Collect an explicit list of residues, sorted by numeric suffix
    pub fn collect_residues(
        &self,
        residues: &[String],
        cluster_params: &ClusterParameters,
    ) -> Vec<ResidueResult> {
        let mut results: Vec<ResidueResult> = residues
            .iter()
            .map(|r| self.residue_tau(r, cluster_params))
            .collect();
        sort_results(&mut results);
        info!(
            "{} residues collected, {} with an estimate",
            results.len(),
            results.iter().filter(|r| r.is_success()).count()
        );
        results
    }

    /// Load, cluster again and save back every residue on the runner's pool.
    pub fn reprocess(&self, runner: &ParallelGibbs) -> Result<Vec<ResidueResult>> {
        let residues = self.discover()?;
        let cluster_params = &runner.config.cluster;
        let mut results = runner.map_residues(
            &residues,
            |_, residue| {
                let result = Gibbs::load(&self.artifact_path(residue)).and_then(|mut gibbs| {
                    gibbs.process(cluster_params)?;
                    gibbs.save(&self.root)?;
                    gibbs.tau()
                });
                ResidueResult::from_result(residue, residue_number(residue), result)
            },
            |residue| residue.as_str(),
        )?;
        sort_results(&mut results);
        Ok(results)
    }

    /// Write residue, resid, lower, mode, upper, status
    pub fn write_taus(results: &[ResidueResult], path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Error creating the file {}", path.display()))?;
        for r in results {
            let tau = r.tau();
            writer.serialize(TauRow {
                residue: &r.residue,
                resid: r.resid,
                lower: tau.lower,
                mode: tau.mode,
                upper: tau.upper,
                status: r.status(),
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn annotations(results: &[ResidueResult]) -> Vec<StructureAnnotation> {
        results.iter().map(StructureAnnotation::new).collect()
    }

    pub fn write_annotations(results: &[ResidueResult], path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Error creating the file {}", path.display()))?;
        for annotation in Self::annotations(results) {
            writer.serialize(annotation)?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub fn sort_results(results: &mut [ResidueResult]) {
    results.sort_by(|a, b| {
        (a.resid.is_none(), a.resid, &a.residue).cmp(&(b.resid.is_none(), b.resid, &b.residue))
    });
}
