// src/eigen/dense.rs
//
// Dense eigensolvers: the full 3N lab-frame problem (`Straight`) and the
// rotated, truncated 2N problem (`RotatedToZ`). Both materialise the
// dynamical matrix and run a general complex eigendecomposition.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Schur};
use num_complex::Complex64;

use crate::complex_field::ComplexField;
use crate::effective_field::FieldEngine;
use crate::error::{Error, Result};
use crate::gyro::{dynamic_operate, dynamic_operate_rotated};
use crate::interactions::LinearHamiltonianCache;
use crate::rotation::RotationToZ;
use crate::vector_field::VectorField;

use super::{EigenSolver, ModeSet};

const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };
const ONE: Complex64 = Complex64 { re: 1.0, im: 0.0 };

/// Schur sweeps allowed per matrix row before giving up.
const SCHUR_SWEEPS_PER_ROW: usize = 100;

/// Discarded 3N eigenvalues larger than this fraction of the spectral radius
/// are reported: the ground state is probably not an equilibrium.
const STRUCTURAL_ZERO_RTOL: f64 = 1e-6;

/// Eigenvalues and unit right eigenvectors (columns) of a general complex
/// matrix, via the complex Schur form T = Q^H A Q and back-substitution on T.
/// `None` when the Schur iteration does not converge.
pub(crate) fn schur_eigendecompose(
    matrix: &DMatrix<Complex64>,
) -> Option<(Vec<Complex64>, DMatrix<Complex64>)> {
    let n = matrix.nrows();
    if n == 0 {
        return Some((Vec::new(), DMatrix::zeros(0, 0)));
    }
    let schur = Schur::try_new(matrix.clone(), f64::EPSILON, SCHUR_SWEEPS_PER_ROW * n)?;
    let (q, t) = schur.unpack();

    let t_norm = t.iter().map(|v| v.norm()).fold(0.0, f64::max);
    let small = (f64::EPSILON * t_norm).max(f64::MIN_POSITIVE);

    let values: Vec<Complex64> = (0..n).map(|i| t[(i, i)]).collect();
    let mut vectors = DMatrix::<Complex64>::zeros(n, n);
    for (idx, &lambda) in values.iter().enumerate() {
        // Solve (T - lambda I) z = 0 with z[idx] = 1 and z[k] = 0 below.
        let mut z = DVector::<Complex64>::zeros(n);
        z[idx] = ONE;
        for k in (0..idx).rev() {
            let mut sum = ZERO;
            for j in (k + 1)..=idx {
                sum += t[(k, j)] * z[j];
            }
            let mut coeff = t[(k, k)] - lambda;
            if coeff.norm() < small {
                coeff = Complex64::new(small, 0.0);
            }
            z[k] = -sum / coeff;
        }
        let v = &q * z;
        let norm = v.norm();
        if norm.is_finite() && norm > 0.0 {
            vectors.set_column(idx, &(v / Complex64::new(norm, 0.0)));
        } else {
            vectors.set_column(idx, &q.column(idx));
        }
    }
    Some((values, vectors))
}

/// General eigendecomposition with the crate's error type.
pub fn eig(matrix: &DMatrix<Complex64>) -> Result<(Vec<Complex64>, DMatrix<Complex64>)> {
    if matrix.iter().any(|v| !(v.re.is_finite() && v.im.is_finite())) {
        return Err(Error::Degenerate(
            "dynamical matrix has non-finite entries".to_string(),
        ));
    }
    schur_eigendecompose(matrix).ok_or_else(|| {
        Error::Factorization(format!(
            "Schur decomposition of the {}x{} dynamical matrix did not converge",
            matrix.nrows(),
            matrix.ncols()
        ))
    })
}

fn column_field(
    vectors: &DMatrix<Complex64>,
    i: usize,
    n_comp: usize,
    grid: crate::grid::Grid3D,
) -> Result<ComplexField> {
    let col: Vec<Complex64> = vectors.column(i).iter().copied().collect();
    let mut v = ComplexField::from_slice(n_comp, grid, &col)?;
    v.normalize()?;
    Ok(v)
}

/// Dense solve of the unreduced 3N problem. The N structurally-zero
/// (longitudinal) eigenpairs are dropped, leaving 2N modes.
#[derive(Debug, Default)]
pub struct Straight {
    cache: LinearHamiltonianCache,
    pub recompute: bool,
}

impl Straight {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EigenSolver for Straight {
    fn name(&self) -> &'static str {
        "straight"
    }

    fn modes(&mut self, engine: &dyn FieldEngine, ground_state: &VectorField) -> Result<ModeSet> {
        let sys = engine.system();
        ground_state.ensure_grid(&sys.grid, "ground state")?;
        let n = sys.n_cells();
        info!("[modes] dense 3N solve ({} x {})", 3 * n, 3 * n);

        let h = self.cache.get_or_build(engine, ground_state, self.recompute)?;
        let d = dynamic_operate(h, ground_state, sys)?;
        let (values, vectors) = eig(&d.to_complex_dmatrix())?;

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].norm().total_cmp(&values[b].norm()));
        let radius = values.iter().map(|v| v.norm()).fold(0.0, f64::max);
        let largest_dropped = values[order[n - 1]].norm();
        if largest_dropped > STRUCTURAL_ZERO_RTOL * radius {
            warn!(
                "[modes] discarded eigenvalue |lambda| = {:.3e} is not small (spectral radius {:.3e}); is the ground state relaxed?",
                largest_dropped, radius
            );
        } else {
            debug!(
                "[modes] discarded {} structural zeros, largest {:.3e}",
                n, largest_dropped
            );
        }

        let kept = &order[n..];
        let eigenvalues = kept.iter().map(|&i| values[i]).collect();
        let modes = kept
            .iter()
            .map(|&i| column_field(&vectors, i, 3, sys.grid))
            .collect::<Result<Vec<_>>>()?;
        ModeSet::new(eigenvalues, modes, None)
    }
}

/// Dense solve of the rotated, truncated 2N problem.
#[derive(Debug, Default)]
pub struct RotatedToZ {
    cache: LinearHamiltonianCache,
    pub recompute: bool,
}

impl RotatedToZ {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often the aggregate self-interaction tensor has been built.
    pub fn tensor_builds(&self) -> usize {
        self.cache.aggregate_builds()
    }
}

impl EigenSolver for RotatedToZ {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn modes(&mut self, engine: &dyn FieldEngine, ground_state: &VectorField) -> Result<ModeSet> {
        let sys = engine.system();
        ground_state.ensure_grid(&sys.grid, "ground state")?;
        let n = sys.n_cells();
        info!("[modes] dense reduced solve ({} x {})", 2 * n, 2 * n);

        let rot = RotationToZ::new(ground_state)?;
        let h = self.cache.get_or_build(engine, ground_state, self.recompute)?;
        let d = dynamic_operate_rotated(&rot.reduce(h)?, sys)?;
        let (values, vectors) = eig(&d.to_complex_dmatrix())?;

        let reduced = (0..values.len())
            .map(|i| column_field(&vectors, i, 2, sys.grid))
            .collect::<Result<Vec<_>>>()?;
        let modes = reduced
            .iter()
            .map(|v| {
                let mut lab = rot.derotate_mode(v)?;
                lab.normalize()?;
                Ok(lab)
            })
            .collect::<Result<Vec<_>>>()?;
        ModeSet::new(values, modes, Some(reduced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effective_field::CpuEngine;
    use crate::grid::Grid3D;
    use crate::params::System;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn residual(a: &DMatrix<Complex64>, lambda: Complex64, v: DVector<Complex64>) -> f64 {
        (a * &v - v * lambda).norm()
    }

    #[test]
    fn schur_eigenpairs_of_random_matrix() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = DMatrix::from_fn(7, 7, |_, _| Complex64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5));
        let (values, vectors) = schur_eigendecompose(&a).unwrap();
        let scale = a.norm();
        for (i, &lambda) in values.iter().enumerate() {
            let v = vectors.column(i).into_owned();
            assert!((v.norm() - 1.0).abs() < 1e-12);
            assert!(residual(&a, lambda, v) < 1e-10 * scale);
        }
    }

    #[test]
    fn triangular_matrix_keeps_its_diagonal() {
        let a = DMatrix::from_row_slice(
            2,
            2,
            &[
                Complex64::new(1.0, 0.0),
                Complex64::new(2.0, 0.0),
                ZERO,
                Complex64::new(3.0, 0.0),
            ],
        );
        let (mut values, _) = eig(&a).unwrap();
        values.sort_by(|a, b| a.re.total_cmp(&b.re));
        assert!((values[0] - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        assert!((values[1] - Complex64::new(3.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn non_finite_matrix_is_degenerate() {
        let mut a = DMatrix::<Complex64>::identity(3, 3);
        a[(1, 2)] = Complex64::new(f64::NAN, 0.0);
        assert!(matches!(eig(&a), Err(Error::Degenerate(_))));
    }

    #[test]
    fn macrospin_frequency_is_kittel_for_a_cube() {
        let grid = Grid3D::new(1, 1, 1, 5e-9, 5e-9, 5e-9);
        let (ms, ku, b) = (8e5, 5e4, 0.1);
        let sys = System::uniform(grid, ms, 1.3e-11, ku, [0.0, 0.0, 1.0], [0.0, 0.0, b]).unwrap();
        let gamma = sys.gamma;
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::new(grid);

        let expected = gamma * (b + 2.0 * ku / ms);
        let set = RotatedToZ::new().modes(&engine, &m).unwrap();
        assert_eq!(set.len(), 2);
        assert!((set.frequencies[0] + expected).abs() < 1e-6 * expected);
        assert!((set.frequencies[1] - expected).abs() < 1e-6 * expected);
        assert!(set.eigenvalues[1].re.abs() < 1e-6 * expected);

        let full = Straight::new().modes(&engine, &m).unwrap();
        assert_eq!(full.len(), 2);
        assert!((full.frequencies[1] - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn reduced_modes_lift_to_transverse_lab_modes() {
        let grid = Grid3D::new(3, 1, 1, 5e-9, 5e-9, 5e-9);
        let sys = System::uniform(grid, 8e5, 1.3e-11, 2e4, [1.0, 0.0, 0.0], [0.1, 0.0, 0.0])
            .unwrap();
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::uniform(grid, [1.0, 0.0, 0.0]);

        let mut solver = RotatedToZ::new();
        let set = solver.modes(&engine, &m).unwrap();
        assert_eq!(set.len(), 6);
        let reduced = set.reduced.as_ref().unwrap();
        let rot = RotationToZ::new(&m).unwrap();
        for (lab, red) in set.modes.iter().zip(reduced) {
            assert!((lab.norm() - 1.0).abs() < 1e-12);
            for r in 0..3 {
                // No component along the ground state (x).
                assert!(lab.get(0, r).norm() < 1e-12);
            }
            let back = rot.rotate_mode(lab).unwrap();
            let mut diff = back.clone();
            diff.axpy(Complex64::new(-1.0, 0.0), red).unwrap();
            assert!(diff.norm() < 1e-10);
        }

        // A second solve for the same system reuses the tensor.
        solver.modes(&engine, &m).unwrap();
        assert_eq!(solver.tensor_builds(), 1);
    }
}
