// src/rotation.rs
//
// Per-cell rotation R_r taking the ground-state direction m_r to +z.
//
// With m = (sinθ cosφ, sinθ sinφ, cosθ):
//
//   R = [[ cosθ cosφ, cosθ sinφ, -sinθ ],
//        [ -sinφ,     cosφ,       0    ],
//        [ sinθ cosφ, sinθ sinφ,  cosθ ]]
//
// Rows 0 and 1 span the plane perpendicular to m; row 2 is m itself.
// On the poles (sinθ = 0) the azimuth is undefined and φ = 0 is used, so
// m = -z maps to diag(-1, 1, -1).

use log::debug;
use rayon::prelude::*;

use crate::complex_field::{ComplexField, RealField};
use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::tensor::Tensor;
use crate::vec3::{mat_mul, mat_mul_t, mat_t_vec, mat_vec, norm, Mat3};
use crate::vector_field::VectorField;

/// Rotation field for one ground state. Read-only once built.
#[derive(Debug, Clone)]
pub struct RotationToZ {
    pub grid: Grid3D,
    rot: Vec<Mat3>,
    source: u64,
}

impl RotationToZ {
    pub fn new(ground_state: &VectorField) -> Result<Self> {
        let mut axial = 0usize;
        let mut rot = Vec::with_capacity(ground_state.data.len());
        for (r, &m) in ground_state.data.iter().enumerate() {
            let len = norm(m);
            if !len.is_finite() || len == 0.0 {
                return Err(Error::Degenerate(format!(
                    "ground state at cell {r} has length {len}"
                )));
            }
            let m = [m[0] / len, m[1] / len, m[2] / len];
            let cth = m[2].clamp(-1.0, 1.0);
            let sth = (m[0] * m[0] + m[1] * m[1]).sqrt();
            let (cph, sph) = if sth > 0.0 {
                (m[0] / sth, m[1] / sth)
            } else {
                axial += 1;
                (1.0, 0.0)
            };
            rot.push([
                [cth * cph, cth * sph, -sth],
                [-sph, cph, 0.0],
                [sth * cph, sth * sph, cth],
            ]);
        }
        if axial > 0 {
            debug!("[rotation] {} axial cells use phi = 0", axial);
        }
        Ok(Self {
            grid: ground_state.grid,
            rot,
            source: ground_state.fingerprint(),
        })
    }

    /// True when this rotation was built from exactly `ground_state`.
    pub fn is_valid_for(&self, ground_state: &VectorField) -> bool {
        self.grid == ground_state.grid && self.source == ground_state.fingerprint()
    }

    #[inline]
    pub fn matrix(&self, r: usize) -> &Mat3 {
        &self.rot[r]
    }

    #[inline]
    pub fn rotate_vector(&self, r: usize, v: [f64; 3]) -> [f64; 3] {
        mat_vec(&self.rot[r], v)
    }

    #[inline]
    pub fn derotate_vector(&self, r: usize, v: [f64; 3]) -> [f64; 3] {
        mat_t_vec(&self.rot[r], v)
    }

    /// Per-block congruence: block (r, r') becomes R_r T_rr' R_r'^T.
    pub fn rotate_tensor(&self, t: &Tensor) -> Result<Tensor> {
        self.grid.ensure_same(&t.grid, "rotated tensor")?;
        if t.n_comp != 3 {
            return Err(Error::shape("rotated tensor", "3 components", t.n_comp));
        }
        let n = self.grid.n_cells();
        let mut out = Tensor::zeros(3, self.grid);

        // One row of cells r at a time: the three rows (c, r) for c = 0..3 are
        // written together, so collect per-cell blocks first.
        let blocks: Vec<Vec<Mat3>> = (0..n)
            .into_par_iter()
            .map(|r| {
                let rr = &self.rot[r];
                (0..n)
                    .map(|r2| {
                        let mut b = [[0.0; 3]; 3];
                        for (c, row) in b.iter_mut().enumerate() {
                            for (c2, v) in row.iter_mut().enumerate() {
                                *v = t.get(c, r, c2, r2);
                            }
                        }
                        mat_mul_t(&mat_mul(rr, &b), &self.rot[r2])
                    })
                    .collect()
            })
            .collect();

        out.rows_mut().enumerate().for_each(|(row, dst)| {
            let (c, r) = (row / n, row % n);
            for (r2, b) in blocks[r].iter().enumerate() {
                for c2 in 0..3 {
                    dst[c2 * n + r2] = b[c][c2];
                }
            }
        });
        Ok(out)
    }

    /// Keep the two components perpendicular to the local ground state.
    pub fn truncate(&self, t: &Tensor) -> Result<Tensor> {
        t.truncate_to(2)
    }

    /// truncate(rotate_tensor(t))
    pub fn reduce(&self, t: &Tensor) -> Result<Tensor> {
        self.truncate(&self.rotate_tensor(t)?)
    }

    /// Lab frame (3 components) to reduced local frame (2 components).
    pub fn rotate_real(&self, v: &RealField) -> Result<RealField> {
        self.check_field(v, 3)?;
        let n = self.grid.n_cells();
        let mut out = RealField::zeros(2, self.grid);
        for r in 0..n {
            let w = self.rotate_vector(r, [v.get(0, r), v.get(1, r), v.get(2, r)]);
            out.set(0, r, w[0]);
            out.set(1, r, w[1]);
        }
        Ok(out)
    }

    /// Reduced local frame (2 components) to lab frame (3 components).
    pub fn derotate_real(&self, v: &RealField) -> Result<RealField> {
        self.check_field(v, 2)?;
        let n = self.grid.n_cells();
        let mut out = RealField::zeros(3, self.grid);
        for r in 0..n {
            let w = self.derotate_vector(r, [v.get(0, r), v.get(1, r), 0.0]);
            for (c, wc) in w.iter().enumerate() {
                out.set(c, r, *wc);
            }
        }
        Ok(out)
    }

    pub fn rotate_mode(&self, v: &ComplexField) -> Result<ComplexField> {
        ComplexField::from_parts(self.rotate_real(&v.re)?, self.rotate_real(&v.im)?)
    }

    pub fn derotate_mode(&self, v: &ComplexField) -> Result<ComplexField> {
        ComplexField::from_parts(self.derotate_real(&v.re)?, self.derotate_real(&v.im)?)
    }

    fn check_field(&self, v: &RealField, n_comp: usize) -> Result<()> {
        self.grid.ensure_same(&v.grid, "mode rotation")?;
        if v.n_comp != n_comp {
            return Err(Error::shape(
                "mode rotation",
                format!("{n_comp} components"),
                v.n_comp,
            ));
        }
        Ok(())
    }
}
