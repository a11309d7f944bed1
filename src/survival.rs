//! Empirical survival function of a set of event durations.
use crate::shared::errors::RtaError;
use crate::shared::utils::min_max;
use anyhow::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurvivalFunction {
    // time unit used for the binning
    pub ts: f64,
    // times (0 followed by the left edges of the non-empty bins)
    pub t: Vec<f64>,
    // probability that an event lasts longer than t
    pub s: Vec<f64>,
}

/// Smallest non-zero gap between the sorted durations, or the minimum
/// duration when they are all identical.
pub fn time_step(times: &[f64]) -> Result<f64> {
    let (min, _) = min_max(times)?;
    let sorted: Vec<f64> = times.iter().copied().sorted_by(|a, b| a.total_cmp(b)).collect();
    Ok(sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .find(|&d| d != 0.)
        .unwrap_or(min))
}

impl SurvivalFunction {
    pub fn new(times: &[f64]) -> Result<SurvivalFunction> {
        let ts = time_step(times)?;
        Self::with_time_step(times, ts)
    }

    pub fn with_time_step(times: &[f64], ts: f64) -> Result<SurvivalFunction> {
        if !(ts > 0.) || !ts.is_finite() {
            return Err(RtaError::invalid(format!("invalid time step {}", ts)).into());
        }
        min_max(times)?;
        // bin b covers [(b + 1) ts, (b + 2) ts); only the non-empty bins are
        // visited, so tiny steps do not grow the output.
        let bins = times
            .iter()
            .map(|&x| (x / ts).floor())
            .filter(|&q| q >= 1.)
            .map(|q| q as u64 - 1)
            .sorted();

        let mut t = vec![0.];
        let mut cumulated = vec![0usize];
        for (bin, group) in &bins.group_by(|&b| b) {
            t.push((bin + 1) as f64 * ts);
            cumulated.push(cumulated[cumulated.len() - 1] + group.count());
        }
        let total = *cumulated.last().unwrap_or(&0);
        let s = if total == 0 {
            vec![1.; t.len()]
        } else {
            cumulated
                .iter()
                .map(|&c| 1. - c as f64 / total as f64)
                .collect()
        };
        Ok(SurvivalFunction { ts, t, s })
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}
