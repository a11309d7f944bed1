//! Gibbs sampling of a mixture of exponentials, one residue at a time

pub mod model;
pub mod sampler;
pub mod trace;

// Re-exporting for public API
pub use self::model::{Gibbs, ProcessedResults};
pub use self::sampler::{Hyperparameters, MixtureGibbsSampler, MixtureState};
pub use self::trace::{PosteriorTrace, TraceView};
