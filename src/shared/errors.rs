//! Failure taxonomy of the residence-time pipeline.
//!
//! Public operations return `anyhow::Result`; the domain failures below are
//! wrapped inside it so that batch code can classify them with
//! `err.downcast_ref::<RtaError>()` and decide whether a residue is skipped,
//! flagged as corrupt or rejected outright.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RtaError {
    /// Rejected before the chain starts (burn-in too long, no data, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The per-residue artifact is not on disk
    #[error("No result at {}", .0.display())]
    MissingResult(PathBuf),

    /// The artifact exists but cannot be used
    #[error("Corrupt artifact {}: {message}", path.display())]
    CorruptArtifact { path: PathBuf, message: String },

    /// Not enough significant components to define a dominant cluster
    #[error("Degenerate clustering: {0}")]
    DegenerateClustering(String),

    #[error("Numerical error: {0}")]
    Numerical(String),
}

impl RtaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RtaError::InvalidConfiguration(message.into())
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        RtaError::DegenerateClustering(message.into())
    }

    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RtaError::CorruptArtifact {
            path: path.into(),
            message: message.into(),
        }
    }
}
