// src/tensor.rs
//
// Dense self-interaction tensor T[c][c'][r][r'] over every (component, cell) pair.
//
// Layout: a single row-major buffer of size (n_comp*N)^2. Row index is c*N + r,
// column index is c'*N + r'. This is exactly the 1-D flattening, and the rows
// are the 2-D flattening, so no reshaping is needed to hand T to nalgebra.
//
// Units: T is an energy density (J/m^3) per unit-vector product, so that
//   E = 1/2 * sum T[c][c'][r][r'] m_c(r) m_c'(r') * V_cell
//   B_si(r) = -(1/Ms(r)) * sum_{c',r'} T[.][c'][r][r'] m_c'(r')

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::DMatrix;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::complex_field::{ComplexField, RealField};
use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::vector_field::VectorField;

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub n_comp: usize,
    pub grid: Grid3D,
    data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(n_comp: usize, grid: Grid3D) -> Self {
        let dim = n_comp * grid.n_cells();
        Self {
            n_comp,
            grid,
            data: vec![0.0; dim * dim],
        }
    }

    pub fn from_1d(n_comp: usize, grid: Grid3D, data: Vec<f64>) -> Result<Self> {
        let dim = n_comp * grid.n_cells();
        if data.len() != dim * dim {
            return Err(Error::shape("tensor buffer", dim * dim, data.len()));
        }
        Ok(Self { n_comp, grid, data })
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.grid.n_cells()
    }

    /// Matrix dimension n_comp * N.
    #[inline]
    pub fn dim(&self) -> usize {
        self.n_comp * self.grid.n_cells()
    }

    #[inline]
    fn flat(&self, c: usize, r: usize, c2: usize, r2: usize) -> usize {
        let n = self.n_cells();
        debug_assert!(c < self.n_comp && c2 < self.n_comp && r < n && r2 < n);
        (c * n + r) * self.dim() + c2 * n + r2
    }

    #[inline]
    pub fn get(&self, c: usize, r: usize, c2: usize, r2: usize) -> f64 {
        self.data[self.flat(c, r, c2, r2)]
    }

    #[inline]
    pub fn set(&mut self, c: usize, r: usize, c2: usize, r2: usize, v: f64) {
        let i = self.flat(c, r, c2, r2);
        self.data[i] = v;
    }

    #[inline]
    pub fn add(&mut self, c: usize, r: usize, c2: usize, r2: usize, v: f64) {
        let i = self.flat(c, r, c2, r2);
        self.data[i] += v;
    }

    /// Row `c*N + r` of the flattened matrix.
    pub fn row(&self, row: usize) -> &[f64] {
        let d = self.dim();
        &self.data[row * d..(row + 1) * d]
    }

    pub(crate) fn rows_mut(&mut self) -> rayon::slice::ChunksMut<'_, f64> {
        let d = self.dim();
        self.data.par_chunks_mut(d)
    }

    pub fn to_1d(&self) -> Vec<f64> {
        self.data.clone()
    }

    pub fn to_2d(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.dim()).map(|r| r.to_vec()).collect()
    }

    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        let d = self.dim();
        DMatrix::from_row_slice(d, d, &self.data)
    }

    pub fn to_complex_dmatrix(&self) -> DMatrix<Complex64> {
        self.to_dmatrix().map(|v| Complex64::new(v, 0.0))
    }

    pub fn ensure_same_shape(&self, other: &Tensor, what: &str) -> Result<()> {
        self.grid.ensure_same(&other.grid, what)?;
        if self.n_comp != other.n_comp {
            return Err(Error::shape(what, format!("{} components", self.n_comp), other.n_comp));
        }
        Ok(())
    }

    /// Elementwise sum of one or more tensors of identical shape.
    pub fn sum(tensors: &[&Tensor]) -> Result<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::Config("Tensor::sum needs at least one tensor".to_string()))?;
        let mut out = (*first).clone();
        for t in &tensors[1..] {
            out.ensure_same_shape(t, "tensor sum")?;
            out.data
                .par_iter_mut()
                .zip(t.data.par_iter())
                .for_each(|(a, b)| *a += b);
        }
        Ok(out)
    }

    /// Largest |T_ab - T_ba| over the flattened matrix.
    pub fn asymmetry(&self) -> f64 {
        let d = self.dim();
        (0..d)
            .into_par_iter()
            .map(|a| {
                (a + 1..d)
                    .map(|b| (self.data[a * d + b] - self.data[b * d + a]).abs())
                    .fold(0.0, f64::max)
            })
            .reduce(|| 0.0, f64::max)
    }

    pub fn max_abs(&self) -> f64 {
        self.data.par_iter().map(|v| v.abs()).reduce(|| 0.0, f64::max)
    }

    /// Keep only the first `n` components of rows and columns.
    pub fn truncate_to(&self, n: usize) -> Result<Tensor> {
        if n > self.n_comp {
            return Err(Error::shape("tensor truncation", format!("<= {}", self.n_comp), n));
        }
        let nc = self.n_cells();
        let mut out = Tensor::zeros(n, self.grid);
        let d_out = out.dim();
        let d_in = self.dim();
        out.rows_mut().enumerate().for_each(|(row, dst)| {
            dst.copy_from_slice(&self.data[row * d_in..row * d_in + d_out]);
        });
        debug_assert_eq!(d_out, n * nc);
        Ok(out)
    }

    /// y = T x (the tensor-field product).
    pub fn apply(&self, x: &RealField) -> Result<RealField> {
        self.check_operand(x.n_comp, &x.grid)?;
        let d = self.dim();
        let mut y = RealField::zeros(self.n_comp, self.grid);
        y.data.par_iter_mut().enumerate().for_each(|(row, yi)| {
            let tr = &self.data[row * d..(row + 1) * d];
            *yi = tr.iter().zip(&x.data).map(|(t, v)| t * v).sum();
        });
        Ok(y)
    }

    /// y = T x for a complex operand (T is real, so parts are independent).
    pub fn apply_complex(&self, x: &ComplexField) -> Result<ComplexField> {
        let re = self.apply(&x.re)?;
        let im = self.apply(&x.im)?;
        ComplexField::from_parts(re, im)
    }

    /// E = 1/2 mᵀ T m · V_cell for a unit-vector field.
    pub fn energy(&self, m: &VectorField) -> Result<f64> {
        let mf = self.field_operand(m)?;
        let tm = self.apply(&mf)?;
        Ok(0.5 * mf.dot(&tm)? * self.grid.cell_volume())
    }

    /// Self-interaction induction B = -(1/Ms) T m (Tesla). Zero where Ms = 0.
    pub fn si_field(&self, m: &VectorField, ms: &[f64]) -> Result<VectorField> {
        let mf = self.field_operand(m)?;
        let tm = self.apply(&mf)?;
        let scaled = self.scale_by_inverse_ms(tm, ms)?;
        scaled.to_vector_field()
    }

    /// Complex version of [`Tensor::si_field`] over a 3-component field.
    pub fn si_field_complex(&self, x: &ComplexField, ms: &[f64]) -> Result<ComplexField> {
        let tx = self.apply_complex(x)?;
        let re = self.scale_by_inverse_ms(tx.re, ms)?;
        let im = self.scale_by_inverse_ms(tx.im, ms)?;
        ComplexField::from_parts(re, im)
    }

    fn scale_by_inverse_ms(&self, mut f: RealField, ms: &[f64]) -> Result<RealField> {
        let n = self.n_cells();
        if ms.len() != n {
            return Err(Error::shape("Ms map", n, ms.len()));
        }
        for c in 0..f.n_comp {
            for (v, &m) in f.comp_mut(c).iter_mut().zip(ms) {
                *v = if m == 0.0 { 0.0 } else { -*v / m };
            }
        }
        Ok(f)
    }

    fn field_operand(&self, m: &VectorField) -> Result<RealField> {
        if self.n_comp != 3 {
            return Err(Error::shape("tensor applied to vector field", "3 components", self.n_comp));
        }
        m.ensure_grid(&self.grid, "tensor operand")?;
        Ok(RealField::from_vector_field(m))
    }

    fn check_operand(&self, n_comp: usize, grid: &Grid3D) -> Result<()> {
        self.grid.ensure_same(grid, "tensor operand")?;
        if n_comp != self.n_comp {
            return Err(Error::shape(
                "tensor operand",
                format!("{} components", self.n_comp),
                n_comp,
            ));
        }
        Ok(())
    }

    /// Write the 2-D flattening as CSV, one row per line.
    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        for row in self.data.chunks(self.dim()) {
            let line: Vec<String> = row.iter().map(|v| format!("{:.10e}", v)).collect();
            writeln!(w, "{}", line.join(","))?;
        }
        w.flush()
    }
}
