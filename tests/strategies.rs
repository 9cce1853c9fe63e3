// tests/strategies.rs
//
// Strategy selection through SolverSettings, fallback and configuration files.

use llg_modes::config::{load_cases, SolverSettings, StrategyKind, SystemParameters};
use llg_modes::effective_field::CpuEngine;
use llg_modes::eigen::{self, solver_for};
use llg_modes::ovf;
use llg_modes::vector_field::VectorField;
use llg_modes::Error;

fn macrospin() -> (CpuEngine, VectorField) {
    let mut p = SystemParameters::slab_example(1, 1);
    p.b_ext = [0.0, 0.0, 0.2];
    let engine = CpuEngine::new(p.to_system().unwrap()).unwrap();
    (engine, VectorField::new(p.grid()))
}

#[test]
fn every_strategy_kind_builds_a_named_solver() {
    let settings = SolverSettings::default();
    let names: Vec<&str> = [
        StrategyKind::Straight,
        StrategyKind::Dense,
        StrategyKind::Cholesky,
        StrategyKind::Arnoldi,
        StrategyKind::ArnoldiMatrix,
    ]
    .into_iter()
    .map(|k| solver_for(k, &settings).unwrap().name())
    .collect();
    assert_eq!(names, vec!["straight", "dense", "cholesky", "arnoldi", "arnoldi-matrix"]);
    assert_eq!(
        "arnoldi-matrix".parse::<StrategyKind>().unwrap(),
        StrategyKind::ArnoldiMatrix
    );
    assert!(matches!("lanczos".parse::<StrategyKind>(), Err(Error::Config(_))));
}

#[test]
fn failing_strategy_falls_back_once() {
    let (engine, m) = macrospin();
    // nev = 6 is impossible for a 2-dimensional reduced problem.
    let mut settings = SolverSettings {
        strategy: StrategyKind::Arnoldi,
        nev: 6,
        ..SolverSettings::default()
    };
    let err = eigen::solve(&engine, &m, &settings).unwrap_err();
    assert!(matches!(err, Error::Arnoldi(_)));

    settings.fallback = Some(StrategyKind::Dense);
    let set = eigen::solve(&engine, &m, &settings).unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.lowest_positive_frequency().unwrap() > 0.0);
}

#[test]
fn bad_timeout_is_a_config_error() {
    let (engine, m) = macrospin();
    let settings = SolverSettings {
        strategy: StrategyKind::Arnoldi,
        timeout_s: Some(-1.0),
        ..SolverSettings::default()
    };
    assert!(matches!(
        eigen::solve(&engine, &m, &settings),
        Err(Error::Config(_))
    ));
}

#[test]
fn case_file_drives_a_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cases.json");
    let cases = vec![SystemParameters::slab_example(2, 1)];
    std::fs::write(&path, serde_json::to_string(&cases).unwrap()).unwrap();

    let loaded = load_cases(&path).unwrap();
    assert_eq!(loaded, cases);

    let engine = CpuEngine::new(loaded[0].to_system().unwrap()).unwrap();
    let m = VectorField::uniform(loaded[0].grid(), [1.0, 0.0, 0.0]);
    let set = eigen::solve(&engine, &m, &SolverSettings::default()).unwrap();
    let written = ovf::write_modes(&dir.path().join("modes"), &set).unwrap();
    assert_eq!(written, set.positive().len());
    assert!(dir.path().join("modes").join("frequencies.csv").exists());
}
