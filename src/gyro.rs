// src/gyro.rs
//
// Gyromagnetic operator: turns the symmetric Hamiltonian tensor H into the
// dynamical matrix D = (gamma / Ms) (m ×) H, whose eigenvalues are i*omega
// in the lossless limit.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::params::System;
use crate::tensor::Tensor;
use crate::vec3::cross_matrix;
use crate::vector_field::VectorField;

/// gamma / Ms(r) for every cell; zero Ms is a degenerate input here.
fn precession_scale(sys: &System) -> Result<Vec<f64>> {
    let empty = sys.empty_cells();
    if !empty.is_empty() {
        return Err(Error::Degenerate(format!(
            "dynamical matrix undefined: {} cell(s) with Ms = 0 (first: {})",
            empty.len(),
            empty[0]
        )));
    }
    Ok(sys.material.ms.iter().map(|&ms| sys.gamma / ms).collect())
}

/// Lab frame: D[p][q][r][r'] = (gamma/Ms(r)) sum_s eps_ps(m_r) H[s][q][r][r'].
pub fn dynamic_operate(h: &Tensor, m: &VectorField, sys: &System) -> Result<Tensor> {
    h.grid.ensure_same(&sys.grid, "hamiltonian")?;
    m.ensure_grid(&sys.grid, "ground state")?;
    if h.n_comp != 3 {
        return Err(Error::shape("lab-frame hamiltonian", "3 components", h.n_comp));
    }
    let scale = precession_scale(sys)?;
    let n = sys.n_cells();
    let mut d = Tensor::zeros(3, sys.grid);
    d.rows_mut().enumerate().for_each(|(row, dst)| {
        let (p, r) = (row / n, row % n);
        let eps = cross_matrix(m.data[r]);
        for (s, &e) in eps[p].iter().enumerate() {
            if e == 0.0 {
                continue;
            }
            let f = e * scale[r];
            for (o, v) in dst.iter_mut().zip(h.row(s * n + r)) {
                *o += f * v;
            }
        }
    });
    Ok(d)
}

/// Rotated frame: (m ×) is the fixed generator J = [[0, -1], [1, 0]] per cell,
/// so D[0][q] = -H[1][q] gamma/Ms and D[1][q] = H[0][q] gamma/Ms.
///
/// Accepts the reduced (2-component) tensor, or the full rotated one, in which
/// case the longitudinal rows of D are zero.
pub fn dynamic_operate_rotated(h: &Tensor, sys: &System) -> Result<Tensor> {
    h.grid.ensure_same(&sys.grid, "rotated hamiltonian")?;
    if h.n_comp != 2 && h.n_comp != 3 {
        return Err(Error::shape("rotated hamiltonian", "2 or 3 components", h.n_comp));
    }
    let scale = precession_scale(sys)?;
    let n = sys.n_cells();
    let mut d = Tensor::zeros(h.n_comp, sys.grid);
    d.rows_mut().enumerate().for_each(|(row, dst)| {
        let (p, r) = (row / n, row % n);
        let (src, sign) = match p {
            0 => (1, -1.0),
            1 => (0, 1.0),
            _ => return,
        };
        let f = sign * scale[r];
        for (o, v) in dst.iter_mut().zip(h.row(src * n + r)) {
            *o = f * v;
        }
    });
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;
    use crate::rotation::RotationToZ;

    fn setup() -> (System, VectorField, Tensor) {
        let grid = Grid3D::new(2, 1, 1, 1e-9, 1e-9, 1e-9);
        let sys = System::uniform(grid, 5e5, 0.0, 0.0, [0.0, 0.0, 1.0], [0.0; 3]).unwrap();
        let mut m = VectorField::uniform(grid, [0.0, 0.6, 0.8]);
        m.data[1] = [0.48, 0.6, 0.64];
        let mut h = Tensor::zeros(3, grid);
        let d = h.dim();
        for a in 0..d {
            for b in 0..=a {
                let v = ((a * 7 + b * 3) as f64).cos();
                h.set(a / 2, a % 2, b / 2, b % 2, v);
                h.set(b / 2, b % 2, a / 2, a % 2, v);
            }
        }
        (sys, m, h)
    }

    #[test]
    fn lab_and_rotated_operators_agree() {
        let (sys, m, h) = setup();
        let rot = RotationToZ::new(&m).unwrap();
        let d_lab = dynamic_operate(&h, &m, &sys).unwrap();
        let d_rot = dynamic_operate_rotated(&rot.rotate_tensor(&h).unwrap(), &sys).unwrap();
        // Rotating the lab-frame D blockwise gives the rotated-frame D.
        let d_lab_rot = rot.rotate_tensor(&d_lab).unwrap();
        for row in 0..d_rot.dim() {
            for (a, b) in d_rot.row(row).iter().zip(d_lab_rot.row(row)) {
                assert!((a - b).abs() < 1e-9 * sys.gamma / 5e5, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn reduced_operator_is_generator_times_h() {
        let (sys, m, h) = setup();
        let rot = RotationToZ::new(&m).unwrap();
        let h2 = rot.reduce(&h).unwrap();
        let d = dynamic_operate_rotated(&h2, &sys).unwrap();
        let s = sys.gamma / 5e5;
        assert_eq!(d.get(0, 1, 1, 0), -s * h2.get(1, 1, 1, 0));
        assert_eq!(d.get(1, 0, 0, 1), s * h2.get(0, 0, 0, 1));
    }

    #[test]
    fn empty_cells_are_rejected() {
        let (mut sys, m, h) = setup();
        sys.material.ms[1] = 0.0;
        assert!(matches!(dynamic_operate(&h, &m, &sys), Err(Error::Degenerate(_))));
        assert!(matches!(
            dynamic_operate_rotated(&h, &sys),
            Err(Error::Degenerate(_))
        ));
    }
}
