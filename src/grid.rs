// src/grid.rs

use crate::error::{Error, Result};

/// Finite-difference grid of nx × ny × nz cuboid cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid3D {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Grid3D {
    /// Create a new grid with nx × ny × nz cells and spacings dx, dy, dz.
    pub fn new(nx: usize, ny: usize, nz: usize, dx: f64, dy: f64, dz: f64) -> Self {
        Self { nx, ny, nz, dx, dy, dz }
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn cell_volume(&self) -> f64 {
        self.dx * self.dy * self.dz
    }

    pub fn size(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    pub fn cell_size(&self) -> [f64; 3] {
        [self.dx, self.dy, self.dz]
    }

    /// Convert (i, j, k) indices to a flat index (x fastest).
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        (k * self.ny + j) * self.nx + i
    }

    /// Inverse of [`Grid3D::idx`].
    #[inline]
    pub fn ijk(&self, r: usize) -> (usize, usize, usize) {
        let i = r % self.nx;
        let j = (r / self.nx) % self.ny;
        let k = r / (self.nx * self.ny);
        (i, j, k)
    }

    /// Reject empty grids and non-positive / non-finite cell sizes.
    pub fn validate(&self) -> Result<()> {
        if self.n_cells() == 0 {
            return Err(Error::Config(format!(
                "grid has no cells ({}x{}x{})",
                self.nx, self.ny, self.nz
            )));
        }
        for (name, d) in [("dx", self.dx), ("dy", self.dy), ("dz", self.dz)] {
            if !(d.is_finite() && d > 0.0) {
                return Err(Error::Config(format!("cell size {name}={d} must be positive")));
            }
        }
        Ok(())
    }

    /// Fail with a shape error unless `other` is the same grid.
    pub fn ensure_same(&self, other: &Grid3D, what: &str) -> Result<()> {
        if self != other {
            return Err(Error::ShapeMismatch {
                what: what.to_string(),
                expected: format!("{self}"),
                got: format!("{other}"),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for Grid3D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{} cells of {:e}x{:e}x{:e} m",
            self.nx, self.ny, self.nz, self.dx, self.dy, self.dz
        )
    }
}
