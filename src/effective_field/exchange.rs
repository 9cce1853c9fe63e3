// src/effective_field/exchange.rs

use crate::error::Result;
use crate::params::System;
use crate::vector_field::VectorField;

/// Exchange stiffness on the face between two cells: harmonic mean, zero if either side is zero.
#[inline]
pub fn interface_stiffness(a1: f64, a2: f64) -> f64 {
    if a1 == 0.0 || a2 == 0.0 {
        0.0
    } else {
        2.0 * a1 * a2 / (a1 + a2)
    }
}

/// Neighbour pairs (r, r + e_axis) along every axis with more than one cell,
/// with the coupling 2 A_ij / d^2 (J/m^3).
///
/// Cells on the boundary simply have fewer pairs (free / Neumann boundary).
pub fn exchange_links(sys: &System) -> Vec<(usize, usize, f64)> {
    let g = sys.grid;
    let a = &sys.material.a_ex;
    let mut links = Vec::new();
    let axes = [(g.nx, g.dx), (g.ny, g.dy), (g.nz, g.dz)];
    for (axis, &(n_axis, d)) in axes.iter().enumerate() {
        if n_axis < 2 {
            continue;
        }
        let inv_d2 = 1.0 / (d * d);
        for k in 0..g.nz {
            for j in 0..g.ny {
                for i in 0..g.nx {
                    let (ni, nj, nk) = match axis {
                        0 => (i + 1, j, k),
                        1 => (i, j + 1, k),
                        _ => (i, j, k + 1),
                    };
                    if ni >= g.nx || nj >= g.ny || nk >= g.nz {
                        continue;
                    }
                    let r = g.idx(i, j, k);
                    let r2 = g.idx(ni, nj, nk);
                    let aij = interface_stiffness(a[r], a[r2]);
                    if aij != 0.0 {
                        links.push((r, r2, 2.0 * aij * inv_d2));
                    }
                }
            }
        }
    }
    links
}

/// Add the exchange induction B_ex (Tesla) to `b_eff`:
///   B_ex(r) = (1/Ms(r)) sum_neighbours 2 A_ij (m(r') - m(r)) / d^2
pub fn add_exchange_field(sys: &System, m: &VectorField, b_eff: &mut VectorField) -> Result<()> {
    m.ensure_grid(&sys.grid, "exchange input")?;
    b_eff.ensure_grid(&sys.grid, "exchange output")?;
    let ms = &sys.material.ms;

    for (r, r2, coupling) in exchange_links(sys) {
        let diff = [
            m.data[r2][0] - m.data[r][0],
            m.data[r2][1] - m.data[r][1],
            m.data[r2][2] - m.data[r][2],
        ];
        if ms[r] != 0.0 {
            let f = coupling / ms[r];
            for c in 0..3 {
                b_eff.data[r][c] += f * diff[c];
            }
        }
        if ms[r2] != 0.0 {
            let f = coupling / ms[r2];
            for c in 0..3 {
                b_eff.data[r2][c] -= f * diff[c];
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;

    #[test]
    fn uniform_state_has_no_exchange_field() {
        let grid = Grid3D::new(4, 3, 2, 2e-9, 2e-9, 2e-9);
        let sys = System::uniform(grid, 8e5, 1.3e-11, 0.0, [0.0, 0.0, 1.0], [0.0; 3]).unwrap();
        let m = VectorField::uniform(grid, [0.6, 0.0, 0.8]);
        let mut b = VectorField::zeros(grid);
        add_exchange_field(&sys, &m, &mut b).unwrap();
        for v in &b.data {
            assert!(v.iter().all(|c| c.abs() < 1e-9), "B_ex={:?}", v);
        }
    }

    #[test]
    fn links_follow_grid_dimensions() {
        let grid = Grid3D::new(3, 2, 1, 1e-9, 2e-9, 1e-9);
        let sys = System::uniform(grid, 8e5, 1e-11, 0.0, [0.0, 0.0, 1.0], [0.0; 3]).unwrap();
        let links = exchange_links(&sys);
        // x: 2 per row * 2 rows, y: 3 columns, z: none.
        assert_eq!(links.len(), 4 + 3);
        let along_y = links.iter().find(|l| l.0 == 0 && l.1 == 3).unwrap();
        assert!((along_y.2 - 2.0 * 1e-11 / 4e-18).abs() < 1e-3);
    }

    #[test]
    fn two_cell_field_points_towards_neighbour() {
        let grid = Grid3D::new(2, 1, 1, 1e-9, 1e-9, 1e-9);
        let sys = System::uniform(grid, 1e6, 1e-11, 0.0, [0.0, 0.0, 1.0], [0.0; 3]).unwrap();
        let mut m = VectorField::new(grid);
        m.data[1] = [1.0, 0.0, 0.0];
        let mut b = VectorField::zeros(grid);
        add_exchange_field(&sys, &m, &mut b).unwrap();
        // 2A/(Ms d^2) = 2e-11 / (1e6 * 1e-18) = 20 T
        assert!((b.data[0][0] - 20.0).abs() < 1e-9);
        assert!((b.data[0][2] + 20.0).abs() < 1e-9);
        assert!((b.data[1][0] + 20.0).abs() < 1e-9);
        assert!((b.data[1][2] - 20.0).abs() < 1e-9);
    }
}
