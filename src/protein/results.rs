use crate::estimate::TauEstimate;
use crate::shared::errors::RtaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a residue has no usable estimate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum ResidueFailure {
    Missing(String),
    Corrupt(String),
    Degenerate(String),
    Invalid(String),
    Numerical(String),
    Cancelled,
    Other(String),
}

impl ResidueFailure {
    /// Classify an error coming out of a residue pipeline
    pub fn from_error(err: &anyhow::Error) -> ResidueFailure {
        match err.downcast_ref::<RtaError>() {
            Some(RtaError::MissingResult(path)) => ResidueFailure::Missing(path.display().to_string()),
            Some(e @ RtaError::CorruptArtifact { .. }) => ResidueFailure::Corrupt(e.to_string()),
            Some(RtaError::DegenerateClustering(m)) => ResidueFailure::Degenerate(m.clone()),
            Some(RtaError::InvalidConfiguration(m)) => ResidueFailure::Invalid(m.clone()),
            Some(RtaError::Numerical(m)) => ResidueFailure::Numerical(m.clone()),
            None => ResidueFailure::Other(format!("{:#}", err)),
        }
    }

    /// Short status used in the reports
    pub fn status(&self) -> &'static str {
        match self {
            ResidueFailure::Missing(_) => "missing",
            ResidueFailure::Corrupt(_) => "corrupt",
            ResidueFailure::Degenerate(_) => "degenerate",
            ResidueFailure::Invalid(_) => "invalid",
            ResidueFailure::Numerical(_) => "numerical",
            ResidueFailure::Cancelled => "cancelled",
            ResidueFailure::Other(_) => "error",
        }
    }
}

impl fmt::Display for ResidueFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResidueFailure::Cancelled => write!(f, "cancelled"),
            ResidueFailure::Missing(m)
            | ResidueFailure::Corrupt(m)
            | ResidueFailure::Degenerate(m)
            | ResidueFailure::Invalid(m)
            | ResidueFailure::Numerical(m)
            | ResidueFailure::Other(m) => write!(f, "{}: {}", self.status(), m),
        }
    }
}

/// Outcome of one residue, never an error: failures are kept as data so the
/// protein-level report can go on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResidueResult {
    pub residue: String,
    // numeric suffix of the label, used for sorting
    pub resid: Option<u32>,
    pub outcome: Result<TauEstimate, ResidueFailure>,
}

impl ResidueResult {
    pub fn success(residue: &str, resid: Option<u32>, tau: TauEstimate) -> ResidueResult {
        ResidueResult {
            residue: residue.to_string(),
            resid,
            outcome: Ok(tau),
        }
    }

    pub fn failure(residue: &str, resid: Option<u32>, failure: ResidueFailure) -> ResidueResult {
        ResidueResult {
            residue: residue.to_string(),
            resid,
            outcome: Err(failure),
        }
    }

    pub fn from_result(residue: &str, resid: Option<u32>, result: anyhow::Result<TauEstimate>) -> ResidueResult {
        match result {
            Ok(tau) => Self::success(residue, resid, tau),
            Err(e) => Self::failure(residue, resid, ResidueFailure::from_error(&e)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// (lower, mode, upper), the zero triple for failed residues
    pub fn tau(&self) -> TauEstimate {
        match &self.outcome {
            Ok(t) => *t,
            Err(_) => TauEstimate::zero(),
        }
    }

    pub fn status(&self) -> &'static str {
        match &self.outcome {
            Ok(_) => "ok",
            Err(f) => f.status(),
        }
    }

    /// Asymmetric error bars (mode - lower, upper - mode)
    pub fn bars(&self) -> (f64, f64) {
        let t = self.tau();
        (t.mode - t.lower, t.upper - t.mode)
    }
}
