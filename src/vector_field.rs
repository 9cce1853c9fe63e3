// src/vector_field.rs

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::vec3::normalize;

/// Unit-vector (or field) data on a 3D grid. Each cell stores (x, y, z).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    pub grid: Grid3D,
    pub data: Vec<[f64; 3]>,
}

impl VectorField {
    /// Create a new field on the given grid, initialised along +z.
    pub fn new(grid: Grid3D) -> Self {
        let n = grid.n_cells();
        Self {
            grid,
            data: vec![[0.0, 0.0, 1.0]; n],
        }
    }

    pub fn zeros(grid: Grid3D) -> Self {
        Self {
            grid,
            data: vec![[0.0; 3]; grid.n_cells()],
        }
    }

    pub fn uniform(grid: Grid3D, v: [f64; 3]) -> Self {
        Self {
            grid,
            data: vec![v; grid.n_cells()],
        }
    }

    pub fn from_data(grid: Grid3D, data: Vec<[f64; 3]>) -> Result<Self> {
        if data.len() != grid.n_cells() {
            return Err(Error::ShapeMismatch {
                what: "vector field data".to_string(),
                expected: format!("{} cells", grid.n_cells()),
                got: format!("{} cells", data.len()),
            });
        }
        Ok(Self { grid, data })
    }

    /// Set all cells to the same vector (x, y, z).
    pub fn set_uniform(&mut self, x: f64, y: f64, z: f64) {
        for cell in &mut self.data {
            *cell = [x, y, z];
        }
    }

    /// Get the flat index in `data` for grid indices (i, j, k).
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        self.grid.idx(i, j, k)
    }

    pub fn normalize(&mut self) {
        for v in &mut self.data {
            *v = normalize(*v);
        }
    }

    /// Add uniform random noise of amplitude `amp` to every cell and renormalise.
    pub fn perturb(&mut self, amp: f64, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for v in &mut self.data {
            for c in v.iter_mut() {
                *c += amp * (rng.gen::<f64>() - 0.5);
            }
            *v = normalize(*v);
        }
    }

    pub fn average(&self) -> [f64; 3] {
        let mut s = [0.0; 3];
        for v in &self.data {
            s[0] += v[0];
            s[1] += v[1];
            s[2] += v[2];
        }
        let n = self.data.len().max(1) as f64;
        [s[0] / n, s[1] / n, s[2] / n]
    }

    /// Hash of the grid and the exact bit patterns of every value.
    ///
    /// Used to decide whether cached rotations / tensors are still valid for a field.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.grid.size().hash(&mut h);
        for d in self.grid.cell_size() {
            d.to_bits().hash(&mut h);
        }
        for v in &self.data {
            for c in v {
                c.to_bits().hash(&mut h);
            }
        }
        h.finish()
    }

    pub fn ensure_grid(&self, grid: &Grid3D, what: &str) -> Result<()> {
        grid.ensure_same(&self.grid, what)?;
        if self.data.len() != grid.n_cells() {
            return Err(Error::ShapeMismatch {
                what: what.to_string(),
                expected: format!("{} cells", grid.n_cells()),
                got: format!("{} cells", self.data.len()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perturbed_field_stays_normalised() {
        let grid = Grid3D::new(3, 2, 2, 1.0, 1.0, 1.0);
        let mut m = VectorField::uniform(grid, [1.0, 0.0, 0.0]);
        m.perturb(0.2, 7);
        for v in &m.data {
            let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            assert!((n - 1.0).abs() < 1e-12, "|m|={}", n);
        }
        assert!(m.average()[0] > 0.9);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let grid = Grid3D::new(2, 2, 1, 1.0, 1.0, 1.0);
        let a = VectorField::new(grid);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.data[3][0] = 1e-12;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
