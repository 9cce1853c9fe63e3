// tests/equivalence.rs
//
// Cross-strategy agreement: every eigensolver strategy must describe the same
// spectrum and the same mode subspaces.
// Run only these tests: cargo test --test equivalence

use nalgebra::DMatrix;
use num_complex::Complex64;

use llg_modes::config::SystemParameters;
use llg_modes::effective_field::{CpuEngine, FieldEngine};
use llg_modes::eigen::compare::{self, Tolerances};
use llg_modes::eigen::dense::eig;
use llg_modes::eigen::{
    ArnoldiConfig, ArnoldiField, ArnoldiMatrix, CholeskyFirst, EigenSolver, ModeSet, RotatedToZ,
    Straight, Which,
};
use llg_modes::grid::Grid3D;
use llg_modes::gyro::dynamic_operate;
use llg_modes::linearize::linear_hamiltonian;
use llg_modes::params::System;
use llg_modes::vector_field::VectorField;

/// Perpendicular system with a strong bias field: +z is a strict minimum.
fn perpendicular(grid: Grid3D) -> CpuEngine {
    let sys = System::uniform(grid, 8e5, 1.3e-11, 5e4, [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]).unwrap();
    CpuEngine::new(sys).unwrap()
}

/// Thin layer with an in-plane field that is neither along an axis nor
/// along the easy axis: the relaxed state is tilted and varies from cell to cell.
fn tilted(grid: Grid3D) -> CpuEngine {
    let sys = System::uniform(grid, 8e5, 1.3e-11, 5e4, [0.0, 0.0, 1.0], [0.3, 0.1, 0.0]).unwrap();
    CpuEngine::new(sys).unwrap()
}

fn relaxed_from(engine: &CpuEngine, start: [f64; 3]) -> VectorField {
    let mut m = VectorField::uniform(engine.system().grid, start);
    m.normalize();
    let report = engine.relax(&mut m).unwrap();
    assert!(report.converged, "relaxation failed: {report:?}");
    m
}

fn relaxed(engine: &CpuEngine) -> VectorField {
    relaxed_from(engine, [0.0, 0.0, 1.0])
}

/// The 3N lab-frame problem has 2N finite eigenvalues and N zero modes, and
/// the straight solve keeps exactly the finite ones.
fn check_unreduced_problem(engine: &CpuEngine, m: &VectorField) {
    let n = engine.system().n_cells();
    let h = linear_hamiltonian(engine, m).unwrap();
    let d = dynamic_operate(&h, m, engine.system()).unwrap();
    let full: DMatrix<Complex64> = d.to_complex_dmatrix();
    let (values, _) = eig(&full).unwrap();
    let scale = values.iter().map(|l| l.norm()).fold(0.0, f64::max);
    let nonzero = values.iter().filter(|l| l.norm() > 1e-6 * scale).count();
    assert_eq!(nonzero, 2 * n);

    let straight = Straight::new().modes(engine, m).unwrap();
    let reduced = RotatedToZ::new().modes(engine, m).unwrap();
    assert_eq!(straight.len(), reduced.len());
    assert!(compare::frequencies_agree(&straight.frequencies, &reduced.frequencies, 1e-3));
    let report = compare::assert_equivalent(&straight, &reduced, &Tolerances::default())
        .unwrap_or_else(|e| panic!("straight vs dense: {e}"));
    assert_eq!(report.compared, 2 * n);
}

fn check_all_strategies(engine: &CpuEngine, m: &VectorField) {
    let dense = RotatedToZ::new().modes(engine, m).unwrap();
    let n = engine.system().n_cells();
    assert_eq!(dense.len(), 2 * n);

    let herm = CholeskyFirst::new().modes(engine, m).unwrap();
    assert!(compare::frequencies_agree(&herm.frequencies, &dense.frequencies, 1e-6));

    let cfg = ArnoldiConfig::new(6).with_which(Which::SmallestMagnitude);
    let free = ArnoldiField::new(cfg.clone()).modes(engine, m).unwrap();
    let explicit = ArnoldiMatrix::new(cfg).modes(engine, m).unwrap();

    let tol = Tolerances::default();
    let sets: [(&str, &ModeSet); 3] = [("cholesky", &herm), ("arnoldi", &free), ("arnoldi-matrix", &explicit)];
    for (name, set) in sets {
        let report = compare::assert_equivalent(set, &dense, &tol)
            .unwrap_or_else(|e| panic!("{name} vs dense: {e}"));
        assert_eq!(report.compared, set.len());
        for v in &set.modes {
            assert!(compare::is_normalised(v, 1e-5), "{name}: mode not normalised");
        }
    }
    // And the other way round for the full dense sets.
    compare::assert_equivalent(&dense, &herm, &tol).unwrap();
}

#[test]
fn strategies_agree_on_a_flat_patch() {
    let engine = perpendicular(Grid3D::new(3, 3, 1, 5e-9, 5e-9, 5e-9));
    // In a single layer +z is an exact equilibrium.
    let m = VectorField::new(engine.system().grid);
    check_all_strategies(&engine, &m);
}

#[test]
fn strategies_agree_on_a_small_cube() {
    let engine = perpendicular(Grid3D::new(2, 2, 2, 5e-9, 5e-9, 5e-9));
    let m = relaxed(&engine);
    check_all_strategies(&engine, &m);
}

#[test]
fn unreduced_problem_has_n_zero_modes() {
    let grid = Grid3D::new(3, 2, 1, 5e-9, 5e-9, 5e-9);
    let engine = perpendicular(grid);
    check_unreduced_problem(&engine, &VectorField::new(grid));
}

#[test]
fn tilted_ground_state_keeps_every_strategy_in_agreement() {
    let engine = tilted(Grid3D::new(3, 2, 1, 5e-9, 5e-9, 5e-9));
    let m = relaxed_from(&engine, [1.0, 0.2, 0.3]);

    // The state really is off every axis.
    let off_axis = m
        .data
        .iter()
        .all(|v| v.iter().all(|c| c.abs() < 1.0 - 1e-3));
    assert!(off_axis, "relaxed state is axial: {:?}", m.data);

    check_unreduced_problem(&engine, &m);
    check_all_strategies(&engine, &m);
}

#[test]
fn tilted_small_cube_keeps_every_strategy_in_agreement() {
    let engine = tilted(Grid3D::new(2, 2, 2, 5e-9, 5e-9, 5e-9));
    let m = relaxed_from(&engine, [1.0, 0.2, 0.3]);
    check_unreduced_problem(&engine, &m);
    check_all_strategies(&engine, &m);
}

#[test]
fn slab_lowest_frequency_agrees_between_dense_and_arnoldi() {
    // Material and field of the reference slab, which uses 20 nm cells.
    let mut params = SystemParameters::slab_example(4, 2);
    params.dx = 20e-9;
    params.dy = 20e-9;
    params.dz = 20e-9;
    let engine = CpuEngine::new(params.to_system().unwrap()).unwrap();
    let m = relaxed_from(&engine, [1.0, 0.0, 0.0]);

    let dense = RotatedToZ::new().modes(&engine, &m).unwrap();
    let cfg = ArnoldiConfig::new(2).with_which(Which::SmallestMagnitude);
    let free = ArnoldiField::new(cfg).modes(&engine, &m).unwrap();

    let a = dense.lowest_positive_frequency().unwrap();
    let b = free.lowest_positive_frequency().unwrap();
    assert!((a - b).abs() < 0.01 * a, "dense {a:e} vs arnoldi {b:e}");
}
