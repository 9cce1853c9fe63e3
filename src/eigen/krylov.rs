// src/eigen/krylov.rs
//
// Iterative strategies: the Arnoldi driver wired to the matrix-free operator
// (`ArnoldiField`) or to the explicit reduced dynamical matrix (`ArnoldiMatrix`).

use log::info;

use crate::effective_field::FieldEngine;
use crate::error::Result;
use crate::gyro::dynamic_operate_rotated;
use crate::interactions::LinearHamiltonianCache;
use crate::operator::{DenseOperator, LinearOperator, MatrixFreeOperator};
use crate::rotation::RotationToZ;
use crate::vector_field::VectorField;

use super::arnoldi::{Arnoldi, ArnoldiConfig, Ido, RitzPairs};
use super::{EigenSolver, ModeSet};

/// Drive the reverse-communication loop to completion with `op`.
///
/// Products are issued strictly one at a time.
pub fn solve<O: LinearOperator + ?Sized>(op: &mut O, config: &ArnoldiConfig) -> Result<RitzPairs> {
    let mut arn = Arnoldi::new(op.n_comp(), *op.grid(), config.clone())?;
    while let Ido::ApplyOperator = arn.iterate()? {
        let (x, y) = arn.operands();
        op.apply(x, y)?;
    }
    info!(
        "[arnoldi] {} iteration(s), {} products, ncv = {}",
        arn.iterations(),
        arn.products(),
        arn.ncv()
    );
    Ok(arn.extract()?)
}

/// Lift reduced Ritz pairs to a lab-frame mode set.
fn mode_set(pairs: RitzPairs, rot: &RotationToZ) -> Result<ModeSet> {
    let mut reduced = Vec::with_capacity(pairs.len());
    let mut modes = Vec::with_capacity(pairs.len());
    for mut v in pairs.vectors {
        v.normalize()?;
        let mut lab = rot.derotate_mode(&v)?;
        lab.normalize()?;
        reduced.push(v);
        modes.push(lab);
    }
    ModeSet::new(pairs.values, modes, Some(reduced))
}

/// Matrix-free Arnoldi: products go through the field engine, so the
/// dynamical matrix is never formed.
#[derive(Debug, Clone)]
pub struct ArnoldiField {
    pub config: ArnoldiConfig,
    products: usize,
}

impl ArnoldiField {
    pub fn new(config: ArnoldiConfig) -> Self {
        Self {
            config,
            products: 0,
        }
    }

    /// Operator applications used by the last solve.
    pub fn products(&self) -> usize {
        self.products
    }
}

impl EigenSolver for ArnoldiField {
    fn name(&self) -> &'static str {
        "arnoldi"
    }

    fn modes(&mut self, engine: &dyn FieldEngine, ground_state: &VectorField) -> Result<ModeSet> {
        let rot = RotationToZ::new(ground_state)?;
        let mut op = MatrixFreeOperator::new(engine, ground_state, &rot)?;
        info!(
            "[modes] matrix-free Arnoldi, nev = {}, n = {}",
            self.config.nev,
            op.dim()
        );
        let pairs = solve(&mut op, &self.config)?;
        self.products = op.calls();
        mode_set(pairs, &rot)
    }
}

/// Arnoldi on the explicit reduced dynamical matrix.
#[derive(Debug)]
pub struct ArnoldiMatrix {
    pub config: ArnoldiConfig,
    pub recompute: bool,
    cache: LinearHamiltonianCache,
}

impl ArnoldiMatrix {
    pub fn new(config: ArnoldiConfig) -> Self {
        Self {
            config,
            recompute: false,
            cache: LinearHamiltonianCache::new(),
        }
    }
}

impl EigenSolver for ArnoldiMatrix {
    fn name(&self) -> &'static str {
        "arnoldi-matrix"
    }

    fn modes(&mut self, engine: &dyn FieldEngine, ground_state: &VectorField) -> Result<ModeSet> {
        let sys = engine.system();
        ground_state.ensure_grid(&sys.grid, "ground state")?;
        let rot = RotationToZ::new(ground_state)?;
        let h = self.cache.get_or_build(engine, ground_state, self.recompute)?;
        let d = dynamic_operate_rotated(&rot.reduce(h)?, sys)?;
        info!(
            "[modes] Arnoldi on explicit matrix, nev = {}, n = {}",
            self.config.nev,
            d.dim()
        );
        let pairs = solve(&mut DenseOperator::new(&d), &self.config)?;
        mode_set(pairs, &rot)
    }
}
