//! Residue-level parallelism and protein-level aggregation

pub mod aggregate;
pub mod parallel;
pub mod results;

pub use self::aggregate::{residue_number, ProteinAggregator, StructureAnnotation};
pub use self::parallel::{ParallelGibbs, ResidueInput};
pub use self::results::{ResidueFailure, ResidueResult};
