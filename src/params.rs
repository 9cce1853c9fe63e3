// src/params.rs

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::vec3::{norm, normalize};
use crate::vector_field::VectorField;

/// Vacuum permeability (T·m/A).
pub const MU0: f64 = 4.0 * std::f64::consts::PI * 1e-7;

/// Gyromagnetic ratio of the Landau–Lifshitz equation, rad/(s·T) (MuMax default).
pub const GAMMA_LL: f64 = 1.7595e11;

/// Per-cell material parameters.
///
/// All maps have one entry per cell of the owning [`System`]'s grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Saturation magnetisation (A/m). Zero marks a non-magnetic cell.
    pub ms: Vec<f64>,
    /// Exchange stiffness (J/m).
    pub a_ex: Vec<f64>,
    /// First-order uniaxial anisotropy constant (J/m³).
    pub k_u: Vec<f64>,
    /// Unit anisotropy axis.
    pub easy_axis: Vec<[f64; 3]>,
}

impl Material {
    pub fn uniform(n_cells: usize, ms: f64, a_ex: f64, k_u: f64, easy_axis: [f64; 3]) -> Self {
        Self {
            ms: vec![ms; n_cells],
            a_ex: vec![a_ex; n_cells],
            k_u: vec![k_u; n_cells],
            easy_axis: vec![normalize(easy_axis); n_cells],
        }
    }

    pub fn n_cells(&self) -> usize {
        self.ms.len()
    }

    /// Mark a cell as non-magnetic.
    pub fn clear_cell(&mut self, r: usize) {
        self.ms[r] = 0.0;
        self.a_ex[r] = 0.0;
        self.k_u[r] = 0.0;
    }
}

/// Immutable description of one micromagnetic system: geometry, material,
/// applied field and gyromagnetic ratio.
///
/// Every builder and solver receives this by reference; nothing is global.
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    pub grid: Grid3D,
    pub material: Material,
    /// Applied induction per cell (T).
    pub b_ext: VectorField,
    pub gamma: f64,
}

impl System {
    pub fn new(grid: Grid3D, material: Material, b_ext: VectorField, gamma: f64) -> Result<Self> {
        let sys = Self {
            grid,
            material,
            b_ext,
            gamma,
        };
        sys.validate()?;
        Ok(sys)
    }

    /// Uniform material and uniform applied field.
    pub fn uniform(
        grid: Grid3D,
        ms: f64,
        a_ex: f64,
        k_u: f64,
        easy_axis: [f64; 3],
        b_ext: [f64; 3],
    ) -> Result<Self> {
        let n = grid.n_cells();
        Self::new(
            grid,
            Material::uniform(n, ms, a_ex, k_u, easy_axis),
            VectorField::uniform(grid, b_ext),
            GAMMA_LL,
        )
    }

    pub fn n_cells(&self) -> usize {
        self.grid.n_cells()
    }

    pub fn cell_volume(&self) -> f64 {
        self.grid.cell_volume()
    }

    #[inline]
    pub fn ms(&self, r: usize) -> f64 {
        self.material.ms[r]
    }

    /// Checked preconditions for every tensor builder and solver.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        let n = self.grid.n_cells();
        let mat = &self.material;
        for (name, len) in [
            ("ms", mat.ms.len()),
            ("a_ex", mat.a_ex.len()),
            ("k_u", mat.k_u.len()),
            ("easy_axis", mat.easy_axis.len()),
        ] {
            if len != n {
                return Err(Error::shape(&format!("material map `{name}`"), n, len));
            }
        }
        self.b_ext.ensure_grid(&self.grid, "external field")?;

        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(Error::Config(format!("gamma={} must be positive", self.gamma)));
        }
        for r in 0..n {
            if !(mat.ms[r].is_finite() && mat.ms[r] >= 0.0) {
                return Err(Error::Config(format!("ms[{r}]={} must be >= 0", mat.ms[r])));
            }
            if !(mat.a_ex[r].is_finite() && mat.a_ex[r] >= 0.0) {
                return Err(Error::Config(format!("a_ex[{r}]={} must be >= 0", mat.a_ex[r])));
            }
            if !mat.k_u[r].is_finite() {
                return Err(Error::Config(format!("k_u[{r}] is not finite")));
            }
            if mat.k_u[r] != 0.0 && (norm(mat.easy_axis[r]) - 1.0).abs() > 1e-9 {
                return Err(Error::Config(format!(
                    "easy_axis[{r}]={:?} is not a unit vector",
                    mat.easy_axis[r]
                )));
            }
        }
        Ok(())
    }

    /// Cells with zero saturation magnetisation.
    pub fn empty_cells(&self) -> Vec<usize> {
        (0..self.n_cells())
            .filter(|&r| self.material.ms[r] == 0.0)
            .collect()
    }

    /// Hash of every parameter that enters the self-interaction tensor.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.grid.size().hash(&mut h);
        for d in self.grid.cell_size() {
            d.to_bits().hash(&mut h);
        }
        let mat = &self.material;
        for r in 0..mat.n_cells() {
            mat.ms[r].to_bits().hash(&mut h);
            mat.a_ex[r].to_bits().hash(&mut h);
            mat.k_u[r].to_bits().hash(&mut h);
            for c in mat.easy_axis[r] {
                c.to_bits().hash(&mut h);
            }
        }
        self.b_ext.fingerprint().hash(&mut h);
        self.gamma.to_bits().hash(&mut h);
        h.finish()
    }
}
