// src/complex_field.rs
//
// Real and complex multi-component fields over the grid.
//
// Storage is component-major: entry (c, r) lives at c*N + r, with the cell
// index r ordered x fastest. The same flattening is used by `Tensor` rows,
// so a field can be fed straight into a tensor product or handed to nalgebra.

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::vec3::dot;
use crate::vector_field::VectorField;

#[derive(Debug, Clone, PartialEq)]
pub struct RealField {
    pub n_comp: usize,
    pub grid: Grid3D,
    pub data: Vec<f64>,
}

impl RealField {
    pub fn zeros(n_comp: usize, grid: Grid3D) -> Self {
        Self {
            n_comp,
            grid,
            data: vec![0.0; n_comp * grid.n_cells()],
        }
    }

    pub fn from_data(n_comp: usize, grid: Grid3D, data: Vec<f64>) -> Result<Self> {
        if data.len() != n_comp * grid.n_cells() {
            return Err(Error::shape(
                "real field data",
                n_comp * grid.n_cells(),
                data.len(),
            ));
        }
        Ok(Self { n_comp, grid, data })
    }

    pub fn from_vector_field(v: &VectorField) -> Self {
        let n = v.grid.n_cells();
        let mut f = Self::zeros(3, v.grid);
        for (r, cell) in v.data.iter().enumerate() {
            for c in 0..3 {
                f.data[c * n + r] = cell[c];
            }
        }
        f
    }

    pub fn to_vector_field(&self) -> Result<VectorField> {
        if self.n_comp != 3 {
            return Err(Error::shape("vector field conversion", "3 components", self.n_comp));
        }
        let n = self.n_cells();
        let data = (0..n)
            .map(|r| [self.data[r], self.data[n + r], self.data[2 * n + r]])
            .collect();
        VectorField::from_data(self.grid, data)
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.grid.n_cells()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, c: usize, r: usize) -> f64 {
        self.data[c * self.n_cells() + r]
    }

    #[inline]
    pub fn set(&mut self, c: usize, r: usize, v: f64) {
        let n = self.n_cells();
        self.data[c * n + r] = v;
    }

    pub fn comp(&self, c: usize) -> &[f64] {
        let n = self.n_cells();
        &self.data[c * n..(c + 1) * n]
    }

    pub fn comp_mut(&mut self, c: usize) -> &mut [f64] {
        let n = self.n_cells();
        &mut self.data[c * n..(c + 1) * n]
    }

    pub fn dot(&self, other: &RealField) -> Result<f64> {
        self.ensure_same_shape(other, "real dot product")?;
        Ok(self.data.iter().zip(&other.data).map(|(a, b)| a * b).sum())
    }

    pub fn scale(&mut self, s: f64) {
        self.data.iter_mut().for_each(|v| *v *= s);
    }

    /// self += s * x
    pub fn axpy(&mut self, s: f64, x: &RealField) -> Result<()> {
        self.ensure_same_shape(x, "real axpy")?;
        for (y, x) in self.data.iter_mut().zip(&x.data) {
            *y += s * x;
        }
        Ok(())
    }

    pub fn norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn ensure_same_shape(&self, other: &RealField, what: &str) -> Result<()> {
        self.grid.ensure_same(&other.grid, what)?;
        if self.n_comp != other.n_comp {
            return Err(Error::shape(what, format!("{} components", self.n_comp), other.n_comp));
        }
        Ok(())
    }
}

/// Paired real/imaginary field buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexField {
    pub re: RealField,
    pub im: RealField,
}

impl ComplexField {
    pub fn zeros(n_comp: usize, grid: Grid3D) -> Self {
        Self {
            re: RealField::zeros(n_comp, grid),
            im: RealField::zeros(n_comp, grid),
        }
    }

    pub fn from_parts(re: RealField, im: RealField) -> Result<Self> {
        re.ensure_same_shape(&im, "complex field parts")?;
        Ok(Self { re, im })
    }

    /// Build from a flat slice in the component-major order.
    pub fn from_slice(n_comp: usize, grid: Grid3D, values: &[Complex64]) -> Result<Self> {
        if values.len() != n_comp * grid.n_cells() {
            return Err(Error::shape(
                "complex field data",
                n_comp * grid.n_cells(),
                values.len(),
            ));
        }
        let mut f = Self::zeros(n_comp, grid);
        for (i, v) in values.iter().enumerate() {
            f.re.data[i] = v.re;
            f.im.data[i] = v.im;
        }
        Ok(f)
    }

    pub fn to_vec(&self) -> Vec<Complex64> {
        self.re
            .data
            .iter()
            .zip(&self.im.data)
            .map(|(&re, &im)| Complex64::new(re, im))
            .collect()
    }

    /// Uniform random entries in [-0.5, 0.5) for both parts.
    pub fn random(n_comp: usize, grid: Grid3D, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut f = Self::zeros(n_comp, grid);
        for i in 0..f.len() {
            f.re.data[i] = rng.gen::<f64>() - 0.5;
            f.im.data[i] = rng.gen::<f64>() - 0.5;
        }
        f
    }

    /// Random 3-component field with every cell vector perpendicular to `m`.
    pub fn random_perpendicular(m: &VectorField, seed: u64) -> Self {
        let mut f = Self::random(3, m.grid, seed);
        let n = m.grid.n_cells();
        for (r, mr) in m.data.iter().enumerate() {
            for part in [&mut f.re, &mut f.im] {
                let v = [part.data[r], part.data[n + r], part.data[2 * n + r]];
                let along = dot(v, *mr);
                for c in 0..3 {
                    part.data[c * n + r] -= along * mr[c];
                }
            }
        }
        f
    }

    #[inline]
    pub fn n_comp(&self) -> usize {
        self.re.n_comp
    }

    #[inline]
    pub fn grid(&self) -> &Grid3D {
        &self.re.grid
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.re.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.re.is_empty()
    }

    #[inline]
    pub fn get(&self, c: usize, r: usize) -> Complex64 {
        Complex64::new(self.re.get(c, r), self.im.get(c, r))
    }

    #[inline]
    pub fn set(&mut self, c: usize, r: usize, v: Complex64) {
        self.re.set(c, r, v.re);
        self.im.set(c, r, v.im);
    }

    pub fn ensure_same_shape(&self, other: &ComplexField, what: &str) -> Result<()> {
        self.re.ensure_same_shape(&other.re, what)
    }

    /// Conjugate dot product ⟨a, b⟩ = Σ conj(a)·b.
    pub fn dotc(a: &ComplexField, b: &ComplexField) -> Result<Complex64> {
        a.ensure_same_shape(b, "conjugate dot product")?;
        let mut re = 0.0;
        let mut im = 0.0;
        for i in 0..a.len() {
            let (ar, ai) = (a.re.data[i], a.im.data[i]);
            let (br, bi) = (b.re.data[i], b.im.data[i]);
            re += ar * br + ai * bi;
            im += ar * bi - ai * br;
        }
        Ok(Complex64::new(re, im))
    }

    pub fn norm(&self) -> f64 {
        (self.re.data.iter().map(|v| v * v).sum::<f64>()
            + self.im.data.iter().map(|v| v * v).sum::<f64>())
        .sqrt()
    }

    /// Scale to unit norm. A zero field is reported as degenerate.
    pub fn normalize(&mut self) -> Result<f64> {
        let n = self.norm();
        if n == 0.0 || !n.is_finite() {
            return Err(Error::Degenerate(format!(
                "cannot normalise a field with norm {n}"
            )));
        }
        self.scale_real(1.0 / n);
        Ok(n)
    }

    pub fn scale_real(&mut self, s: f64) {
        self.re.scale(s);
        self.im.scale(s);
    }

    pub fn scale(&mut self, s: Complex64) {
        for i in 0..self.len() {
            let v = Complex64::new(self.re.data[i], self.im.data[i]) * s;
            self.re.data[i] = v.re;
            self.im.data[i] = v.im;
        }
    }

    /// self += a * x
    pub fn axpy(&mut self, a: Complex64, x: &ComplexField) -> Result<()> {
        self.ensure_same_shape(x, "complex axpy")?;
        for i in 0..self.len() {
            let (xr, xi) = (x.re.data[i], x.im.data[i]);
            self.re.data[i] += a.re * xr - a.im * xi;
            self.im.data[i] += a.re * xi + a.im * xr;
        }
        Ok(())
    }

    /// dst = f1*a + f2*b with real factors.
    pub fn madd2(
        dst: &mut ComplexField,
        a: &ComplexField,
        b: &ComplexField,
        f1: f64,
        f2: f64,
    ) -> Result<()> {
        dst.ensure_same_shape(a, "madd2")?;
        dst.ensure_same_shape(b, "madd2")?;
        for i in 0..dst.len() {
            dst.re.data[i] = f1 * a.re.data[i] + f2 * b.re.data[i];
            dst.im.data[i] = f1 * a.im.data[i] + f2 * b.im.data[i];
        }
        Ok(())
    }

    /// dst = f1*a + f2*b with complex factors.
    pub fn cmadd2(
        dst: &mut ComplexField,
        a: &ComplexField,
        b: &ComplexField,
        f1: Complex64,
        f2: Complex64,
    ) -> Result<()> {
        dst.ensure_same_shape(a, "cmadd2")?;
        dst.ensure_same_shape(b, "cmadd2")?;
        for i in 0..dst.len() {
            let va = Complex64::new(a.re.data[i], a.im.data[i]);
            let vb = Complex64::new(b.re.data[i], b.im.data[i]);
            let v = f1 * va + f2 * vb;
            dst.re.data[i] = v.re;
            dst.im.data[i] = v.im;
        }
        Ok(())
    }

    /// Swap the roles of the real and imaginary buffers (no copy).
    pub fn switch_parts(&mut self) {
        std::mem::swap(&mut self.re, &mut self.im);
    }

    /// Multiply by the imaginary unit in place: i(a + ib) = -b + ia.
    pub fn mul_i(&mut self) {
        self.switch_parts();
        self.re.scale(-1.0);
    }

    pub fn conj(&self) -> ComplexField {
        let mut c = self.clone();
        c.im.scale(-1.0);
        c
    }

    pub fn copy_from(&mut self, src: &ComplexField) -> Result<()> {
        self.ensure_same_shape(src, "copy")?;
        self.re.data.copy_from_slice(&src.re.data);
        self.im.data.copy_from_slice(&src.im.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid3D {
        Grid3D::new(3, 2, 1, 1.0, 1.0, 1.0)
    }

    #[test]
    fn dotc_is_conjugate_linear_in_first_argument() {
        let a = ComplexField::random(2, grid(), 1);
        let b = ComplexField::random(2, grid(), 2);

        let direct: Complex64 = a
            .to_vec()
            .iter()
            .zip(b.to_vec())
            .map(|(x, y)| x.conj() * y)
            .sum();
        let d = ComplexField::dotc(&a, &b).unwrap();
        assert!((d - direct).norm() < 1e-12);

        let mut ia = a.clone();
        ia.mul_i();
        let di = ComplexField::dotc(&ia, &b).unwrap();
        // <i a, b> = -i <a, b>
        assert!((di - Complex64::new(0.0, -1.0) * d).norm() < 1e-12);

        let nn = ComplexField::dotc(&a, &a).unwrap();
        assert!(nn.im.abs() < 1e-14);
        assert!((nn.re - a.norm() * a.norm()).abs() < 1e-12);
    }

    #[test]
    fn switch_parts_swaps_buffers() {
        let a = ComplexField::random(1, grid(), 3);
        let mut b = a.clone();
        b.switch_parts();
        assert_eq!(b.re, a.im);
        assert_eq!(b.im, a.re);
    }

    #[test]
    fn madd_variants_agree_with_scalar_arithmetic() {
        let a = ComplexField::random(3, grid(), 4);
        let b = ComplexField::random(3, grid(), 5);
        let f1 = Complex64::new(0.5, -1.5);
        let f2 = Complex64::new(2.0, 0.25);

        let mut dst = ComplexField::zeros(3, grid());
        ComplexField::cmadd2(&mut dst, &a, &b, f1, f2).unwrap();

        let mut via_axpy = ComplexField::zeros(3, grid());
        via_axpy.axpy(f1, &a).unwrap();
        via_axpy.axpy(f2, &b).unwrap();
        for (x, y) in dst.to_vec().iter().zip(via_axpy.to_vec()) {
            assert!((x - y).norm() < 1e-14);
        }

        ComplexField::madd2(&mut dst, &a, &b, 2.0, -1.0).unwrap();
        for i in 0..dst.len() {
            assert!((dst.re.data[i] - (2.0 * a.re.data[i] - b.re.data[i])).abs() < 1e-15);
        }
    }

    #[test]
    fn random_perpendicular_has_no_longitudinal_part() {
        let mut m = VectorField::uniform(grid(), [0.0, 0.6, 0.8]);
        m.data[2] = [1.0, 0.0, 0.0];
        let f = ComplexField::random_perpendicular(&m, 9);
        let n = grid().n_cells();
        for (r, mr) in m.data.iter().enumerate() {
            for part in [&f.re, &f.im] {
                let v = [part.data[r], part.data[n + r], part.data[2 * n + r]];
                assert!(dot(v, *mr).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn zero_field_cannot_be_normalised() {
        let mut z = ComplexField::zeros(2, grid());
        assert!(matches!(z.normalize(), Err(Error::Degenerate(_))));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let a = ComplexField::zeros(2, grid());
        let b = ComplexField::zeros(3, grid());
        assert!(matches!(
            ComplexField::dotc(&a, &b),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
