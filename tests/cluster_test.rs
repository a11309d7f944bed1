use anyhow::Result;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use restime::cluster::{GaussianMixture, GmmSettings, PosteriorClusterer};
use restime::estimate::ParameterEstimator;
use restime::gibbs::PosteriorTrace;
use restime::shared::errors::RtaError;
use restime::ClusterParameters;

mod common;

/// Two kinetic processes stored in components 0 and 1, swapped every other
/// row, plus a negligible third component. Events 0..60 belong to the slow
/// process, 60..100 to the fast one.
fn switching_trace() -> PosteriorTrace {
    let nrows = 200;
    let mut rng = SmallRng::seed_from_u64(0);
    let mut weights = Array2::<f64>::zeros((nrows, 3));
    let mut rates = Array2::<f64>::zeros((nrows, 3));
    let mut indicator = Array2::<u8>::zeros((nrows, 100));
    for row in 0..nrows {
        let jitter = |rng: &mut SmallRng| 1. + 0.1 * (rng.gen::<f64>() - 0.5);
        let (slow, fast) = if row % 2 == 0 { (0, 1) } else { (1, 0) };
        weights[[row, slow]] = 0.6 * jitter(&mut rng);
        weights[[row, 2]] = 0.001;
        weights[[row, fast]] = 1. - weights[[row, slow]] - 0.001;
        rates[[row, slow]] = 0.01 * jitter(&mut rng);
        rates[[row, fast]] = 0.1 * jitter(&mut rng);
        rates[[row, 2]] = 3.;
        for i in 0..100 {
            indicator[[row, i]] = if i < 60 { slow as u8 } else { fast as u8 };
        }
    }
    PosteriorTrace {
        ncomp: 3,
        g: 10,
        burnin: 0,
        weights,
        rates,
        indicator,
    }
}

#[test]
fn clustering_undoes_label_switching() -> Result<()> {
    let trace = switching_trace();
    let params = common::quick_cluster_params();
    let (labeling, membership) =
        PosteriorClusterer::new(&params).cluster(&trace.after_burnin(), 100, trace.g)?;

    assert_eq!(labeling.n_clusters, 2);
    // the third component is below 10 / 100
    assert_eq!(labeling.len(), 400);
    for (&r, &l) in labeling.rates.iter().zip(&labeling.labels) {
        // label 0 is the slowest process
        if l == 0 {
            assert!(r < 0.02);
        } else {
            assert!(r > 0.05);
        }
    }
    assert_eq!(labeling.iterations[3], 10);

    assert_eq!(membership.probabilities.dim(), (100, 2));
    assert!((membership.probabilities[[0, 0]] - 1.).abs() < 1e-12);
    assert!((membership.probabilities[[99, 1]] - 1.).abs() < 1e-12);
    for event in membership.probabilities.rows() {
        assert!((event.sum() - 1.).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn clustering_is_deterministic() -> Result<()> {
    let trace = switching_trace();
    let params = common::quick_cluster_params();
    let clusterer = PosteriorClusterer::new(&params);
    let (a, _) = clusterer.cluster(&trace.after_burnin(), 100, trace.g)?;
    let (b, _) = clusterer.cluster(&trace.after_burnin(), 100, trace.g)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn estimates_of_switching_trace() -> Result<()> {
    let trace = switching_trace();
    let params = common::quick_cluster_params();
    let (labeling, membership) =
        PosteriorClusterer::new(&params).cluster(&trace.after_burnin(), 100, trace.g)?;
    let estimator = ParameterEstimator::new(&params);
    let components = estimator.components(&labeling, &membership)?;

    assert_eq!(components.len(), 2);
    assert!(components.iter().all(|c| !c.is_noise));
    assert!((components[0].rate - 0.01).abs() < 0.001);
    assert!((components[1].rate - 0.1).abs() < 0.01);
    assert!((components[0].weight - 0.6).abs() < 0.05);
    assert!(components[0].rate_interval.0 <= components[0].rate);
    assert!(components[0].rate <= components[0].rate_interval.1);

    let dominant = estimator.dominant(&components)?;
    assert_eq!(dominant.label, 0);
    let tau = estimator.tau(&labeling, &components)?;
    assert!(tau.lower <= tau.mode && tau.mode <= tau.upper);
    assert!(tau.mode > 90. && tau.mode < 110., "tau {:?}", tau);
    Ok(())
}

#[test]
fn noise_clusters_are_excluded() -> Result<()> {
    let trace = switching_trace();
    // halved memberships all stay below the cutoff
    let params = ClusterParameters {
        noise_cutoff: 1.,
        ..common::quick_cluster_params()
    };
    let (labeling, mut membership) =
        PosteriorClusterer::new(&params).cluster(&trace.after_burnin(), 100, trace.g)?;
    membership.probabilities.mapv_inplace(|p| p * 0.5);
    let estimator = ParameterEstimator::new(&params);
    let components = estimator.components(&labeling, &membership)?;
    assert!(components.iter().all(|c| c.is_noise));
    let err = estimator.tau(&labeling, &components).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RtaError>(),
        Some(RtaError::DegenerateClustering(_))
    ));
    Ok(())
}

#[test]
fn no_significant_component() -> Result<()> {
    let trace = switching_trace();
    // cutoff 2: no weight is significant
    let params = ClusterParameters {
        min_support: 200.,
        ..common::quick_cluster_params()
    };
    let (labeling, membership) =
        PosteriorClusterer::new(&params).cluster(&trace.after_burnin(), 100, trace.g)?;
    assert_eq!(labeling.n_clusters, 1);
    assert!(labeling.is_empty());
    assert!(labeling.mixture.is_none());
    assert!(membership.probabilities.iter().all(|&p| p == 0.));
    let components = ParameterEstimator::new(&params).components(&labeling, &membership)?;
    assert!(components.is_empty());
    Ok(())
}

#[test]
fn gaussian_mixture_two_blobs() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(5);
    let mut data = Vec::new();
    for i in 0..200 {
        let center = if i % 2 == 0 { (-3., 0.) } else { (3., 1.) };
        data.push(nalgebra::Vector2::new(
            center.0 + rng.gen::<f64>() - 0.5,
            center.1 + rng.gen::<f64>() - 0.5,
        ));
    }
    let settings = GmmSettings {
        n_components: 2,
        n_init: 3,
        max_iter: 100,
        tol: 1e-3,
        reg_covar: 1e-6,
    };
    let gmm = GaussianMixture::fit(&data, &settings, &mut rng)?;
    assert!((gmm.weights.iter().sum::<f64>() - 1.).abs() < 1e-9);
    let labels = gmm.predict(&data)?;
    for i in 2..data.len() {
        assert_eq!(labels[i], labels[i % 2]);
    }
    assert_ne!(labels[0], labels[1]);

    let too_few = GaussianMixture::fit(&data[..1], &settings, &mut rng);
    assert!(too_few.is_err());
    Ok(())
}
