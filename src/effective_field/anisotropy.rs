// src/effective_field/anisotropy.rs

use crate::error::Result;
use crate::params::System;
use crate::vec3::dot;
use crate::vector_field::VectorField;

/// Add uniaxial anisotropy contribution to B_eff (Tesla).
///
/// For w_ani = -K_u (m·u)^2, we get:
///   B_ani = (2 K_u / M_s) (m·u) u
pub fn add_uniaxial_anisotropy_field(
    sys: &System,
    m: &VectorField,
    b_eff: &mut VectorField,
) -> Result<()> {
    m.ensure_grid(&sys.grid, "anisotropy input")?;
    b_eff.ensure_grid(&sys.grid, "anisotropy output")?;
    let mat = &sys.material;

    for (r, (m_cell, b_cell)) in m.data.iter().zip(b_eff.data.iter_mut()).enumerate() {
        let (k_u, ms) = (mat.k_u[r], mat.ms[r]);
        if k_u == 0.0 || ms == 0.0 {
            continue;
        }
        let u = mat.easy_axis[r];
        let coeff = 2.0 * k_u / ms * dot(*m_cell, u);
        b_cell[0] += coeff * u[0];
        b_cell[1] += coeff * u[1];
        b_cell[2] += coeff * u[2];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;

    #[test]
    fn field_is_along_axis_with_expected_magnitude() {
        let grid = Grid3D::new(1, 1, 1, 1e-9, 1e-9, 1e-9);
        let sys = System::uniform(grid, 8e5, 0.0, 4e5, [0.0, 0.0, 1.0], [0.0; 3]).unwrap();
        let m = VectorField::uniform(grid, [0.6, 0.0, 0.8]);
        let mut b = VectorField::zeros(grid);
        add_uniaxial_anisotropy_field(&sys, &m, &mut b).unwrap();
        // 2*4e5/8e5 * 0.8 = 0.8 T
        assert_eq!(b.data[0][0], 0.0);
        assert!((b.data[0][2] - 0.8).abs() < 1e-12);
    }
}
