// src/operator.rs
//
// Linear operators on complex fields, as consumed by the iterative eigensolver.

use crate::complex_field::{ComplexField, RealField};
use crate::effective_field::FieldEngine;
use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::rotation::RotationToZ;
use crate::tensor::Tensor;
use crate::vec3::dot;
use crate::vector_field::VectorField;

pub trait LinearOperator {
    /// Components per cell of the operand.
    fn n_comp(&self) -> usize;

    fn grid(&self) -> &Grid3D;

    fn dim(&self) -> usize {
        self.n_comp() * self.grid().n_cells()
    }

    /// y = A x
    fn apply(&mut self, x: &ComplexField, y: &mut ComplexField) -> Result<()>;
}

/// Multiplication by an explicit (materialised) dynamical matrix.
pub struct DenseOperator<'a> {
    matrix: &'a Tensor,
}

impl<'a> DenseOperator<'a> {
    pub fn new(matrix: &'a Tensor) -> Self {
        Self { matrix }
    }
}

impl LinearOperator for DenseOperator<'_> {
    fn n_comp(&self) -> usize {
        self.matrix.n_comp
    }

    fn grid(&self) -> &Grid3D {
        &self.matrix.grid
    }

    fn apply(&mut self, x: &ComplexField, y: &mut ComplexField) -> Result<()> {
        let out = self.matrix.apply_complex(x)?;
        y.copy_from(&out)
    }
}

/// Reduced dynamical matrix applied through the field engine, never materialised.
///
/// For a reduced trial vector x:
///   s = R^T x                                  (lab frame, perpendicular to m)
///   h = -B_si(s) + (m·B_eff) s                 (B_si: demag + exchange + anisotropy)
///   y = gamma J (R h)_xy                       (J = [[0, -1], [1, 0]])
/// which equals D x for the explicit D built by the dense path.
pub struct MatrixFreeOperator<'a> {
    engine: &'a dyn FieldEngine,
    rotation: &'a RotationToZ,
    /// m·B_eff at the ground state, per cell.
    parallel_field: Vec<f64>,
    calls: usize,
}

impl<'a> MatrixFreeOperator<'a> {
    pub fn new(
        engine: &'a dyn FieldEngine,
        ground_state: &VectorField,
        rotation: &'a RotationToZ,
    ) -> Result<Self> {
        let sys = engine.system();
        ground_state.ensure_grid(&sys.grid, "ground state")?;
        if !rotation.is_valid_for(ground_state) {
            return Err(Error::Config(
                "rotation was built for a different ground state".to_string(),
            ));
        }
        let empty = sys.empty_cells();
        if !empty.is_empty() {
            return Err(Error::Degenerate(format!(
                "matrix-free operator undefined: {} cell(s) with Ms = 0",
                empty.len()
            )));
        }
        let b_eff = engine.effective_field(ground_state)?;
        let parallel_field = ground_state
            .data
            .iter()
            .zip(&b_eff.data)
            .map(|(m, b)| dot(*m, *b))
            .collect();
        Ok(Self {
            engine,
            rotation,
            parallel_field,
            calls: 0,
        })
    }

    /// Number of operator applications so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn apply_part(&self, x: &RealField) -> Result<RealField> {
        let sys = self.engine.system();
        let s = self.rotation.derotate_real(x)?.to_vector_field()?;
        let mut b = VectorField::zeros(sys.grid);
        self.engine.add_self_interaction_field(&s, &mut b)?;

        let mut h = VectorField::zeros(sys.grid);
        for (r, hr) in h.data.iter_mut().enumerate() {
            let lam = self.parallel_field[r];
            for c in 0..3 {
                hr[c] = -b.data[r][c] + lam * s.data[r][c];
            }
        }

        let mut y = RealField::zeros(2, sys.grid);
        for r in 0..sys.n_cells() {
            let w = self.rotation.rotate_vector(r, h.data[r]);
            y.set(0, r, -sys.gamma * w[1]);
            y.set(1, r, sys.gamma * w[0]);
        }
        Ok(y)
    }
}

impl LinearOperator for MatrixFreeOperator<'_> {
    fn n_comp(&self) -> usize {
        2
    }

    fn grid(&self) -> &Grid3D {
        &self.rotation.grid
    }

    fn apply(&mut self, x: &ComplexField, y: &mut ComplexField) -> Result<()> {
        if x.n_comp() != 2 {
            return Err(Error::shape("matrix-free operand", "2 components", x.n_comp()));
        }
        // Operator is real: real and imaginary parts go through independently.
        let re = self.apply_part(&x.re)?;
        let im = self.apply_part(&x.im)?;
        self.calls += 1;
        y.copy_from(&ComplexField::from_parts(re, im)?)
    }
}
