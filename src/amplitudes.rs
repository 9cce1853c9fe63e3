// src/amplitudes.rs
//
// Projection of a magnetisation snapshot onto computed mode profiles.
//
// The deviation from the ground state m0 is measured as the spin deviation
//   s = sqrt(2 / (1 + m·m0)) (m - (m·m0) m0),
// which is transverse to m0 and reduces to m - m0 for small deviations.
// Its image s × m0 is dotted with the real and imaginary parts of each mode.

use num_complex::Complex64;

use crate::complex_field::ComplexField;
use crate::error::{Error, Result};
use crate::vec3::{cross, dot, scale};
use crate::vector_field::VectorField;

/// Per-cell spin deviation of `m` from `ground_state`.
pub fn spin_deviation(m: &VectorField, ground_state: &VectorField) -> Result<VectorField> {
    m.ensure_grid(&ground_state.grid, "magnetisation snapshot")?;
    let mut out = VectorField::zeros(m.grid);
    for (r, ((mr, m0), s)) in m
        .data
        .iter()
        .zip(&ground_state.data)
        .zip(out.data.iter_mut())
        .enumerate()
    {
        let along = dot(*mr, *m0);
        if along <= -1.0 {
            return Err(Error::Degenerate(format!(
                "cell {r} is antiparallel to the ground state"
            )));
        }
        let factor = (2.0 / (1.0 + along)).sqrt();
        let t = [
            mr[0] - along * m0[0],
            mr[1] - along * m0[1],
            mr[2] - along * m0[2],
        ];
        *s = scale(t, factor);
    }
    Ok(out)
}

/// Complex amplitude of `m` along each lab-frame mode profile.
pub fn mode_amplitudes(
    m: &VectorField,
    ground_state: &VectorField,
    modes: &[ComplexField],
) -> Result<Vec<Complex64>> {
    let dev = spin_deviation(m, ground_state)?;
    let n = m.grid.n_cells();
    let rotated: Vec<[f64; 3]> = dev
        .data
        .iter()
        .zip(&ground_state.data)
        .map(|(s, m0)| cross(*s, *m0))
        .collect();

    modes
        .iter()
        .map(|mode| {
            if mode.n_comp() != 3 {
                return Err(Error::shape("mode profile", "3 components", mode.n_comp()));
            }
            mode.grid().ensure_same(&m.grid, "mode profile")?;
            let mut re = 0.0;
            let mut im = 0.0;
            for (r, v) in rotated.iter().enumerate() {
                for (c, vc) in v.iter().enumerate() {
                    re += mode.re.data[c * n + r] * vc;
                    im += mode.im.data[c * n + r] * vc;
                }
            }
            Ok(Complex64::new(re, im))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;
    use crate::vec3::norm;

    fn grid() -> Grid3D {
        Grid3D::new(2, 1, 1, 1.0, 1.0, 1.0)
    }

    #[test]
    fn small_tilt_gives_linear_deviation() {
        let g = grid();
        let m0 = VectorField::new(g);
        let eps = 1e-4;
        let mut m = VectorField::uniform(g, [eps, 0.0, 1.0]);
        m.normalize();
        let s = spin_deviation(&m, &m0).unwrap();
        for v in &s.data {
            assert!((v[0] - eps).abs() < 1e-10);
            assert!(v[2].abs() < 1e-15);
        }
    }

    #[test]
    fn deviation_length_is_chord_of_the_sphere() {
        // |s| = 2 sin(θ/2) = |m - m0| for unit vectors.
        let g = grid();
        let m0 = VectorField::new(g);
        let m = VectorField::uniform(g, [0.6, 0.0, 0.8]);
        let s = spin_deviation(&m, &m0).unwrap();
        let chord = norm([0.6, 0.0, -0.2]);
        assert!((norm(s.data[0]) - chord).abs() < 1e-12);
    }

    #[test]
    fn amplitude_picks_out_matching_profile() {
        let g = grid();
        let m0 = VectorField::new(g);
        let mut m = VectorField::uniform(g, [0.0, 0.01, 1.0]);
        m.normalize();
        // s × z for s along y is along x: a profile along x sees it, one along y does not.
        let mut along_x = ComplexField::zeros(3, g);
        along_x.set(0, 0, Complex64::new(1.0, 0.0));
        let mut along_y = ComplexField::zeros(3, g);
        along_y.set(1, 0, Complex64::new(0.0, 1.0));
        let amps = mode_amplitudes(&m, &m0, &[along_x, along_y]).unwrap();
        assert!(amps[0].re > 0.0099 && amps[0].re < 0.0101);
        assert_eq!(amps[1], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn reversed_cell_is_degenerate() {
        let g = grid();
        let m0 = VectorField::new(g);
        let mut m = VectorField::new(g);
        m.data[1] = [0.0, 0.0, -1.0];
        assert!(matches!(spin_deviation(&m, &m0), Err(Error::Degenerate(_))));
    }
}
