use anyhow::Result;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use restime::protein::aggregate::sort_results;
use restime::protein::{residue_number, ProteinAggregator, StructureAnnotation};
use restime::shared::errors::RtaError;
use restime::{
    Gibbs, ParallelGibbs, ResidueFailure, ResidueInput, ResidueResult, RunConfig, TauEstimate,
};
use std::fs;
use std::sync::atomic::Ordering;

mod common;

fn quick_config(nproc: usize) -> RunConfig {
    RunConfig {
        gibbs: common::quick_params(3),
        cluster: common::quick_cluster_params(),
        nproc,
    }
}

fn inputs() -> Vec<ResidueInput> {
    vec![
        ResidueInput::new("W59", common::exponential_mixture(200, &[0.7, 0.3], &[0.05, 1.], 1)),
        ResidueInput::new("A7", common::exponential_mixture(200, &[0.7, 0.3], &[0.05, 1.], 2)),
        ResidueInput::new("T102", common::exponential_mixture(200, &[0.7, 0.3], &[0.05, 1.], 3)),
    ]
}

#[test]
fn save_and_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let times = common::exponential_mixture(150, &[0.6, 0.4], &[0.05, 0.5], 8);
    let params = common::quick_params(3);
    let mut gibbs = Gibbs::run("L12", times, &params, &mut SmallRng::seed_from_u64(8))?;
    gibbs.process(&common::quick_cluster_params())?;

    let path = gibbs.save(dir.path())?;
    assert_eq!(path, dir.path().join("L12").join("gibbs_2000.json"));
    let loaded = Gibbs::load(&path)?;
    assert_eq!(loaded, gibbs);

    // saving again keeps the previous artifact as a backup
    loaded.save(dir.path())?;
    assert!(dir.path().join("L12").join("gibbs_2000.json.bak").exists());
    assert_eq!(Gibbs::load(&path)?, gibbs);
    Ok(())
}

#[test]
fn load_recomputes_missing_parts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let times = common::exponential_mixture(120, &[1.], &[0.2], 4);
    let mut gibbs = Gibbs::run("M3", times, &common::quick_params(2), &mut SmallRng::seed_from_u64(4))?;
    let survival = gibbs.survival.take();
    gibbs.trace.indicator = ndarray::Array2::zeros((0, 0));
    let path = gibbs.save(dir.path())?;

    let mut loaded = Gibbs::load(&path)?;
    assert_eq!(loaded.survival, survival);
    assert!(!loaded.trace.has_indicator(120));
    loaded.process(&common::quick_cluster_params())?;
    assert!(loaded.trace.has_indicator(120));
    Ok(())
}

#[test]
fn load_failures_are_classified() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = Gibbs::load(&dir.path().join("nothing.json")).unwrap_err();
    assert!(matches!(
        missing.downcast_ref::<RtaError>(),
        Some(RtaError::MissingResult(_))
    ));

    let path = dir.path().join("broken.json");
    fs::write(&path, "{\"residue\": ")?;
    let corrupt = Gibbs::load(&path).unwrap_err();
    assert!(matches!(
        corrupt.downcast_ref::<RtaError>(),
        Some(RtaError::CorruptArtifact { .. })
    ));
    Ok(())
}

#[test]
fn residue_numbers() {
    assert_eq!(residue_number("W59"), Some(59));
    assert_eq!(residue_number("T102"), Some(102));
    assert_eq!(residue_number("LIG"), None);
}

#[test]
fn parallel_run_keeps_input_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runner = ParallelGibbs::new(quick_config(2))?
        .with_output(dir.path())
        .without_progress();
    let results = runner.run(&inputs())?;
    let names: Vec<&str> = results.iter().map(|r| r.residue.as_str()).collect();
    assert_eq!(names, vec!["W59", "A7", "T102"]);
    for r in &results {
        assert!(dir.path().join(&r.residue).join("gibbs_2000.json").exists());
        let t = r.tau();
        assert!(t.lower <= t.mode && t.mode <= t.upper);
    }

    // same seeds, same estimates
    let again = ParallelGibbs::new(quick_config(1))?.without_progress().run(&inputs())?;
    assert_eq!(results, again);
    Ok(())
}

#[test]
fn cancelled_residues_are_not_run() -> Result<()> {
    let runner = ParallelGibbs::new(quick_config(2))?.without_progress();
    runner.cancel_flag().store(true, Ordering::SeqCst);
    let results = runner.run(&inputs())?;
    assert!(results
        .iter()
        .all(|r| r.outcome == Err(ResidueFailure::Cancelled)));
    assert!(results.iter().all(|r| r.tau() == TauEstimate::zero()));
    Ok(())
}

#[test]
fn collect_degrades_to_zeros() -> Result<()> {
    let dir = tempfile::tempdir()?;
    ParallelGibbs::new(quick_config(2))?
        .with_output(dir.path())
        .without_progress()
        .run(&inputs())?;
    // a residue directory without artifact and one with a broken file
    fs::create_dir(dir.path().join("G80"))?;
    fs::create_dir(dir.path().join("S3"))?;
    fs::write(dir.path().join("S3").join("gibbs_2000.json"), "not json")?;

    let aggregator = ProteinAggregator::new(dir.path(), 2000);
    let results = aggregator.collect(&common::quick_cluster_params())?;
    let names: Vec<&str> = results.iter().map(|r| r.residue.as_str()).collect();
    assert_eq!(names, vec!["S3", "A7", "W59", "G80", "T102"]);

    assert!(matches!(results[0].outcome, Err(ResidueFailure::Corrupt(_))));
    assert!(matches!(results[3].outcome, Err(ResidueFailure::Missing(_))));
    assert_eq!(results[0].tau(), TauEstimate::zero());
    assert_eq!(results[3].bars(), (0., 0.));
    assert!(results[1].is_success());

    let csv_path = dir.path().join("taus.csv");
    ProteinAggregator::write_taus(&results, &csv_path)?;
    let content = fs::read_to_string(&csv_path)?;
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("residue,resid,lower,mode,upper,status"));
    assert!(lines.next().unwrap_or("").starts_with("S3,3,0.0,0.0,0.0,corrupt"));
    assert_eq!(content.lines().count(), 6);
    Ok(())
}

#[test]
fn reprocess_saves_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runner = ParallelGibbs::new(quick_config(2))?
        .with_output(dir.path())
        .without_progress();
    let first = runner.run(&inputs())?;
    let aggregator = ProteinAggregator::new(dir.path(), 2000);
    let results = aggregator.reprocess(&runner)?;
    assert_eq!(results.len(), 3);
    assert!(dir.path().join("A7").join("gibbs_2000.json.bak").exists());
    // same clustering seed, same answer
    for r in &results {
        let before = first.iter().find(|f| f.residue == r.residue);
        assert_eq!(before.map(|b| b.tau()), Some(r.tau()));
    }
    Ok(())
}

#[test]
fn structure_annotations() {
    let ok = ResidueResult::success(
        "W59",
        Some(59),
        TauEstimate {
            lower: 2.,
            mode: 3.456,
            upper: 6.,
        },
    );
    let failed = ResidueResult::failure("A7", Some(7), ResidueFailure::Cancelled);
    let annotations = ProteinAggregator::annotations(&[ok, failed]);
    assert_eq!(
        annotations[0],
        StructureAnnotation {
            residue: "W59".to_string(),
            resid: Some(59),
            tempfactor: 3.46,
            occupancy: 0.86,
        }
    );
    // 0 / 0 is reported as 0
    assert_eq!(annotations[1].tempfactor, 0.);
    assert_eq!(annotations[1].occupancy, 0.);
}

#[test]
fn run_config_from_json() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"gibbs": {"ncomp": 4, "niter": 1000, "g": 10, "burnin": 100, "seed": 3}, "nproc": 2}"#)?;
    let config = RunConfig::load_json(&path)?;
    assert_eq!(config.gibbs.ncomp, 4);
    assert_eq!(config.gibbs.seed, Some(3));
    assert_eq!(config.cluster.n_init, 117);
    assert_eq!(config.nproc, 2);

    fs::write(&path, r#"{"gibbs": {"ncomp": 4, "niter": 100, "g": 10, "burnin": 100, "seed": null}}"#)?;
    assert!(RunConfig::load_json(&path).is_err());
    Ok(())
}

#[test]
fn parallel_results_sorted_by_residue_number() -> Result<()> {
    let runner = ParallelGibbs::new(quick_config(2))?.without_progress();
    let mut results = runner.run(&inputs())?;
    sort_results(&mut results);
    let names: Vec<&str> = results.iter().map(|r| r.residue.as_str()).collect();
    assert_eq!(names, vec!["A7", "W59", "T102"]);
    Ok(())
}

#[test]
fn missing_residue_is_a_zero_triple() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let aggregator = ProteinAggregator::new(dir.path(), 2000);
    let result = aggregator.residue_tau("Y21", &common::quick_cluster_params());
    assert_eq!(result.resid, Some(21));
    assert!(matches!(result.outcome, Err(ResidueFailure::Missing(_))));
    assert_eq!(result.status(), "missing");
    assert_eq!(result.tau(), TauEstimate::zero());
    Ok(())
}
