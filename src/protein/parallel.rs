//! Fixed-size worker pool running one full residue pipeline per task
use crate::estimate::TauEstimate;
use crate::gibbs::Gibbs;
use crate::protein::aggregate::residue_number;
use crate::protein::results::{ResidueFailure, ResidueResult};
use crate::shared::parameters::RunConfig;
use anyhow::Result;
#[cfg(feature = "kdam")]
use kdam::TqdmParallelIterator;
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Durations of the binding events of one residue
#[derive(Clone, Debug, PartialEq)]
pub struct ResidueInput {
    pub residue: String,
    pub times: Vec<f64>,
}

impl ResidueInput {
    pub fn new(residue: &str, times: Vec<f64>) -> ResidueInput {
        ResidueInput {
            residue: residue.to_string(),
            times,
        }
    }
}

pub struct ParallelGibbs {
    pub config: RunConfig,
    // where the per-residue bundles are saved, nothing is written if None
    pub output: Option<PathBuf>,
    pub show_progress: bool,
    cancel: Arc<AtomicBool>,
}

impl ParallelGibbs {
    pub fn new(config: RunConfig) -> Result<ParallelGibbs> {
        config.validate()?;
        Ok(ParallelGibbs {
            config,
            output: None,
            show_progress: true,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_output(mut self, root: &Path) -> Self {
        self.output = Some(root.to_path_buf());
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Shared flag: once set, residues that have not started are skipped.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Random generator of the residue at position `index`
    pub fn rng_for(&self, index: usize) -> SmallRng {
        match self.config.gibbs.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => SmallRng::from_entropy(),
        }
    }

    /// Sample, cluster and estimate every residue. The results come back in
    /// input order; the call itself only fails if the pool cannot be built.
    pub fn run(&self, inputs: &[ResidueInput]) -> Result<Vec<ResidueResult>> {
        self.map_residues(
            inputs,
            |index, input| {
                let result = self.analyse(index, input);
                ResidueResult::from_result(&input.residue, residue_number(&input.residue), result)
            },
            |input| input.residue.as_str(),
        )
    }

    fn analyse(&self, index: usize, input: &ResidueInput) -> Result<TauEstimate> {
        let mut rng = self.rng_for(index);
        let mut gibbs = Gibbs::run(&input.residue, input.times.clone(), &self.config.gibbs, &mut rng)?;
        // the trace is saved even when its clustering fails
        let processed = gibbs.process(&self.config.cluster).map(|_| ());
        if let Some(root) = &self.output {
            gibbs.save(root)?;
        }
        processed?;
        gibbs.tau()
    }

    /// Apply `task` to every item on a pool of `nproc` threads, honouring
    /// the cancellation flag before each item starts.
    pub fn map_residues<T, F, N>(&self, items: &[T], task: F, name: N) -> Result<Vec<ResidueResult>>
    where
        T: Sync,
        F: Fn(usize, &T) -> ResidueResult + Sync,
        N: Fn(&T) -> &str + Sync,
    {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.nproc)
            .build()?;
        let cancel = &self.cancel;
        let job = |(index, item): (usize, &T)| {
            let residue = name(item);
            if cancel.load(Ordering::SeqCst) {
                return ResidueResult::failure(
                    residue,
                    residue_number(residue),
                    ResidueFailure::Cancelled,
                );
            }
            let result = task(index, item);
            match &result.outcome {
                Ok(tau) => info!(
                    "{}: tau = {:.3} [{:.3}, {:.3}]",
                    residue, tau.mode, tau.lower, tau.upper
                ),
                Err(failure) => warn!("{}: {}", residue, failure),
            }
            result
        };

        let indexed: Vec<(usize, &T)> = items.iter().enumerate().collect();
        Ok(pool.install(|| {
            #[cfg(feature = "kdam")]
            if self.show_progress {
                return indexed.into_par_iter().tqdm().map(job).collect::<Vec<_>>();
            }
            indexed.into_par_iter().map(job).collect::<Vec<_>>()
        }))
    }
}
