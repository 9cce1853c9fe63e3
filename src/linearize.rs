// src/linearize.rs
//
// Second-order expansion of the energy about a ground state.
//
//   H = T + diag_r( Ms(r) B_ext(r)·m(r) - sum_r' m(r)·T[r][r']·m(r') )
//
// The diagonal term is Ms (m·B_eff) at the ground state, i.e. the local
// energy density of the effective field along m. It is added to every
// component of the cell's diagonal block.

use rayon::prelude::*;

use crate::complex_field::RealField;
use crate::effective_field::FieldEngine;
use crate::error::{Error, Result};
use crate::interactions::self_interaction_tensor;
use crate::params::System;
use crate::tensor::Tensor;
use crate::vec3::dot;
use crate::vector_field::VectorField;

/// Per-cell ground-state correction sum_r' m(r)·T[r][r']·m(r') (J/m^3).
pub fn ground_state_term(aggregate: &Tensor, m: &VectorField) -> Result<Vec<f64>> {
    m.ensure_grid(&aggregate.grid, "ground state")?;
    let mf = RealField::from_vector_field(m);
    let tm = aggregate.apply(&mf)?;
    let n = m.grid.n_cells();
    Ok((0..n)
        .into_par_iter()
        .map(|r| dot(m.data[r], [tm.get(0, r), tm.get(1, r), tm.get(2, r)]))
        .collect())
}

/// Per-cell Zeeman energy density Ms(r) B_ext(r)·m(r) (J/m^3).
pub fn zeeman_term(sys: &System, m: &VectorField) -> Result<Vec<f64>> {
    m.ensure_grid(&sys.grid, "ground state")?;
    Ok((0..sys.n_cells())
        .map(|r| sys.ms(r) * dot(sys.b_ext.data[r], m.data[r]))
        .collect())
}

/// Linear Hamiltonian tensor about `ground_state`.
///
/// The ground state is not checked for equilibrium; callers that care can
/// compare `FieldEngine::max_torque` against their tolerance first.
pub fn linearize(aggregate: &Tensor, ground_state: &VectorField, sys: &System) -> Result<Tensor> {
    aggregate.grid.ensure_same(&sys.grid, "aggregate tensor")?;
    if aggregate.n_comp != 3 {
        return Err(Error::shape(
            "aggregate tensor",
            "3 components",
            aggregate.n_comp,
        ));
    }
    let gs = ground_state_term(aggregate, ground_state)?;
    let zee = zeeman_term(sys, ground_state)?;

    let mut h = aggregate.clone();
    for r in 0..sys.n_cells() {
        let diag = zee[r] - gs[r];
        for c in 0..3 {
            h.add(c, r, c, r, diag);
        }
    }
    Ok(h)
}

/// Build the aggregate tensor from the engine and linearize about `ground_state`.
pub fn linear_hamiltonian(engine: &dyn FieldEngine, ground_state: &VectorField) -> Result<Tensor> {
    let aggregate = self_interaction_tensor(engine)?;
    linearize(&aggregate, ground_state, engine.system())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effective_field::CpuEngine;
    use crate::grid::Grid3D;
    use crate::params::MU0;

    #[test]
    fn macrospin_diagonal_is_effective_field_along_m() {
        // Cube: demag is isotropic, so the correction cancels it exactly.
        let grid = Grid3D::new(1, 1, 1, 5e-9, 5e-9, 5e-9);
        let ms = 8e5;
        let ku = 4e4;
        let b = 0.2;
        let sys = System::uniform(grid, ms, 0.0, ku, [0.0, 0.0, 1.0], [0.0, 0.0, b]).unwrap();
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::new(grid);

        let h = linear_hamiltonian(&engine, &m).unwrap();
        let demag_diag = MU0 / 3.0 * ms * ms;
        // xx: demag + Ms B + 2 Ku - demag
        let expected = demag_diag + ms * b + 2.0 * ku - demag_diag;
        assert!((h.get(0, 0, 0, 0) - expected).abs() < 1e-9 * expected);
        assert!((h.get(1, 0, 1, 0) - expected).abs() < 1e-9 * expected);
        // zz: demag - 2 Ku + Ms B + 2 Ku - demag = Ms B
        assert!((h.get(2, 0, 2, 0) - ms * b).abs() < 1e-9 * expected);
    }

    #[test]
    fn linearized_tensor_stays_symmetric() {
        let grid = Grid3D::new(3, 1, 1, 5e-9, 5e-9, 5e-9);
        let sys = System::uniform(grid, 8e5, 1.3e-11, 0.0, [0.0, 0.0, 1.0], [0.1, 0.0, 0.0])
            .unwrap();
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::uniform(grid, [1.0, 0.0, 0.0]);
        let h = linear_hamiltonian(&engine, &m).unwrap();
        assert!(h.asymmetry() <= 1e-12 * h.max_abs());
    }

    #[test]
    fn reduced_tensor_is_rejected() {
        let grid = Grid3D::new(2, 1, 1, 5e-9, 5e-9, 5e-9);
        let sys = System::uniform(grid, 8e5, 1.3e-11, 0.0, [0.0, 0.0, 1.0], [0.0; 3]).unwrap();
        let m = VectorField::new(grid);
        let reduced = Tensor::zeros(2, grid);
        assert!(matches!(
            linearize(&reduced, &m, &sys),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
