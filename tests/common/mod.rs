use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use restime::{ClusterParameters, GibbsParameters};

/// Durations drawn from a mixture of exponentials (weights, rates)
#[cfg(test)]
#[allow(dead_code)]
pub fn exponential_mixture(n: usize, weights: &[f64], rates: &[f64], seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let exps: Vec<Exp<f64>> = rates.iter().map(|&r| Exp::new(r).unwrap()).collect();
    (0..n)
        .map(|_| {
            let u: f64 = rng.gen();
            let mut acc = 0.;
            let mut k = weights.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                acc += w;
                if u < acc {
                    k = i;
                    break;
                }
            }
            exps[k].sample(&mut rng)
        })
        .collect()
}

/// 1000 events, 70% with rate 0.01 and 30% with rate 0.1
#[cfg(test)]
#[allow(dead_code)]
pub fn two_processes() -> Vec<f64> {
    exponential_mixture(1000, &[0.7, 0.3], &[0.01, 0.1], 42)
}

/// Short chain, enough for the tests that do not look at the estimates
#[cfg(test)]
#[allow(dead_code)]
pub fn quick_params(ncomp: usize) -> GibbsParameters {
    GibbsParameters::new(ncomp, 2000, 10, 500).with_seed(7)
}

/// Clustering settings with few restarts to keep the tests fast
#[cfg(test)]
#[allow(dead_code)]
pub fn quick_cluster_params() -> ClusterParameters {
    ClusterParameters {
        n_init: 5,
        ..Default::default()
    }
}
