//! Clustering of the posterior draws into global kinetic components

pub mod gmm;
pub mod labeling;

pub use self::gmm::{GaussianMixture, GmmSettings};
pub use self::labeling::{ClusterLabeling, MembershipIndicator, PosteriorClusterer};
