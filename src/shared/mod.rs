//! Functionalities shared by the sampler, the clustering and the protein-level code
pub mod distributions;
pub mod errors;
pub mod parameters;
pub mod utils;

pub use errors::RtaError;
pub use parameters::{ClusterParameters, GibbsParameters, RunConfig};
