// src/eigen/cholesky.rs
//
// Hermitian reformulation of the reduced problem.
//
// With S = diag(gamma / Ms) the reduced dynamical matrix is D = S J H.
// Because S is constant on each cell's 2x2 block it commutes with J, so
//
//   D = S^1/2 (J H') S^-1/2,   H' = S^1/2 H S^1/2 = L L^T.
//
// J L L^T is similar to K = L^T J L (real, antisymmetric), and M = -i K is
// Hermitian with real eigenvalues omega. An eigenvector w of M maps back to
// the eigenvector v = S^1/2 L^-T w of D with eigenvalue i omega.
//
// H' is positive definite exactly when the ground state is a strict energy
// minimum; otherwise the factorisation fails.

use log::info;
use nalgebra::{Cholesky, DMatrix, SymmetricEigen};
use num_complex::Complex64;

use crate::complex_field::ComplexField;
use crate::effective_field::FieldEngine;
use crate::error::{Error, Result};
use crate::interactions::LinearHamiltonianCache;
use crate::rotation::RotationToZ;
use crate::vector_field::VectorField;

use super::{EigenSolver, ModeSet};

const HERMITIAN_SWEEPS: usize = 10_000;

#[derive(Debug, Default)]
pub struct CholeskyFirst {
    cache: LinearHamiltonianCache,
    pub recompute: bool,
}

impl CholeskyFirst {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EigenSolver for CholeskyFirst {
    fn name(&self) -> &'static str {
        "cholesky"
    }

    fn modes(&mut self, engine: &dyn FieldEngine, ground_state: &VectorField) -> Result<ModeSet> {
        let sys = engine.system();
        ground_state.ensure_grid(&sys.grid, "ground state")?;
        let empty = sys.empty_cells();
        if !empty.is_empty() {
            return Err(Error::Degenerate(format!(
                "Hermitian reduction undefined: {} cell(s) with Ms = 0",
                empty.len()
            )));
        }
        let n = sys.n_cells();
        let dim = 2 * n;
        info!("[modes] Cholesky-symmetrised solve ({} x {})", dim, dim);

        let rot = RotationToZ::new(ground_state)?;
        let h = self.cache.get_or_build(engine, ground_state, self.recompute)?;
        let h_red = rot.reduce(h)?.to_dmatrix();

        let sqrt_s: Vec<f64> = (0..dim)
            .map(|i| (sys.gamma / sys.ms(i % n)).sqrt())
            .collect();
        let mut h_scaled = DMatrix::from_fn(dim, dim, |r, c| sqrt_s[r] * h_red[(r, c)] * sqrt_s[c]);
        // Symmetric up to round-off; make it exact for the factorisation.
        let h_t = h_scaled.transpose();
        h_scaled = (h_scaled + h_t) * 0.5;

        let chol = Cholesky::new(h_scaled).ok_or_else(|| {
            Error::Factorization(
                "scaled reduced Hamiltonian is not positive definite (ground state not a strict minimum?)"
                    .to_string(),
            )
        })?;
        let l = chol.l();

        // (J L) row (0, r) = -L row (1, r); row (1, r) = L row (0, r).
        let jl = DMatrix::from_fn(dim, dim, |r, c| {
            if r < n {
                -l[(r + n, c)]
            } else {
                l[(r - n, c)]
            }
        });
        let k = l.transpose() * jl;
        let m = DMatrix::from_fn(dim, dim, |r, c| {
            Complex64::new(0.0, -0.5 * (k[(r, c)] - k[(c, r)]))
        });

        let eigen = SymmetricEigen::try_new(m, f64::EPSILON, HERMITIAN_SWEEPS).ok_or_else(|| {
            Error::Factorization("Hermitian eigendecomposition did not converge".to_string())
        })?;

        let lt = l.transpose().map(|v| Complex64::new(v, 0.0));
        let u = lt
            .solve_upper_triangular(&eigen.eigenvectors)
            .ok_or_else(|| Error::Factorization("singular Cholesky factor".to_string()))?;

        let mut eigenvalues = Vec::with_capacity(dim);
        let mut reduced = Vec::with_capacity(dim);
        let mut modes = Vec::with_capacity(dim);
        for (i, &omega) in eigen.eigenvalues.iter().enumerate() {
            let col: Vec<Complex64> = u
                .column(i)
                .iter()
                .zip(&sqrt_s)
                .map(|(v, s)| *v * *s)
                .collect();
            let mut v = ComplexField::from_slice(2, sys.grid, &col)?;
            v.normalize()?;
            let mut lab = rot.derotate_mode(&v)?;
            lab.normalize()?;
            eigenvalues.push(Complex64::new(0.0, omega));
            reduced.push(v);
            modes.push(lab);
        }
        ModeSet::new(eigenvalues, modes, Some(reduced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eigen::dense::RotatedToZ;
    use crate::effective_field::CpuEngine;
    use crate::grid::Grid3D;
    use crate::params::System;

    #[test]
    fn frequencies_match_dense_reduced_solve() {
        let grid = Grid3D::new(4, 1, 1, 5e-9, 5e-9, 5e-9);
        let sys = System::uniform(grid, 8e5, 1.3e-11, 3e4, [1.0, 0.0, 0.0], [0.05, 0.0, 0.0])
            .unwrap();
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::uniform(grid, [1.0, 0.0, 0.0]);

        let herm = CholeskyFirst::new().modes(&engine, &m).unwrap();
        let dense = RotatedToZ::new().modes(&engine, &m).unwrap();
        assert_eq!(herm.len(), 8);
        for (a, b) in herm.frequencies.iter().zip(&dense.frequencies) {
            assert!((a - b).abs() < 1e-8 * b.abs().max(1.0), "{a} vs {b}");
        }
        for v in &herm.modes {
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn unstable_state_fails_factorisation() {
        // Magnetisation against the field: a maximum, not a minimum.
        let grid = Grid3D::new(1, 1, 1, 5e-9, 5e-9, 5e-9);
        let sys = System::uniform(grid, 8e5, 0.0, 0.0, [0.0, 0.0, 1.0], [0.0, 0.0, 0.5]).unwrap();
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::uniform(grid, [0.0, 0.0, -1.0]);
        assert!(matches!(
            CholeskyFirst::new().modes(&engine, &m),
            Err(Error::Factorization(_))
        ));
    }
}
