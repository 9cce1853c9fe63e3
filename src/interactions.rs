// src/interactions.rs
//
// Builders for the self-interaction tensor of each interaction, the aggregate
// tensor, and a fingerprint-keyed cache with an explicit recompute flag.

use log::debug;
use rayon::prelude::*;

use crate::effective_field::exchange::exchange_links;
use crate::effective_field::{DemagKernel, FieldEngine};
use crate::error::{Error, Result};
use crate::linearize::linearize;
use crate::params::System;
use crate::tensor::Tensor;
use crate::vector_field::VectorField;

/// T[c][c'][r][r'] = -Ms(r) K_cc'(r - r') Ms(r').
///
/// The kernel already carries mu0 (Tesla per A/m). For Nz = 1 the kernel's
/// xz / yz components are stored as exact zeros.
pub fn demag_tensor(sys: &System, kernel: &DemagKernel) -> Result<Tensor> {
    sys.validate()?;
    sys.grid.ensure_same(&kernel.grid, "demag kernel")?;
    let n = sys.n_cells();
    let ms = &sys.material.ms;

    let mut t = Tensor::zeros(3, sys.grid);
    t.rows_mut().enumerate().for_each(|(row, dst)| {
        let (c, r) = (row / n, row % n);
        if ms[r] == 0.0 {
            return;
        }
        for c2 in 0..3 {
            for r2 in 0..n {
                dst[c2 * n + r2] = -ms[r] * kernel.between(c, c2, r, r2) * ms[r2];
            }
        }
    });
    Ok(t)
}

/// Nearest-neighbour exchange: for each linked pair with coupling
/// 2 A_ij / d^2, T[c][c][r][r'] = -coupling and the diagonal gets +coupling.
pub fn exchange_tensor(sys: &System) -> Result<Tensor> {
    sys.validate()?;
    let mut t = Tensor::zeros(3, sys.grid);
    for (r, r2, coupling) in exchange_links(sys) {
        for c in 0..3 {
            t.add(c, r, c, r2, -coupling);
            t.add(c, r2, c, r, -coupling);
            t.add(c, r, c, r, coupling);
            t.add(c, r2, c, r2, coupling);
        }
    }
    Ok(t)
}

/// T[c][c'][r][r] = -2 K_u u_c u_c'
pub fn anisotropy_tensor(sys: &System) -> Result<Tensor> {
    sys.validate()?;
    let mat = &sys.material;
    let mut t = Tensor::zeros(3, sys.grid);
    for r in 0..sys.n_cells() {
        let k_u = mat.k_u[r];
        if k_u == 0.0 {
            continue;
        }
        let u = mat.easy_axis[r];
        for c in 0..3 {
            for c2 in 0..3 {
                t.set(c, r, c2, r, -2.0 * k_u * u[c] * u[c2]);
            }
        }
    }
    Ok(t)
}

/// Demag + exchange + anisotropy for the engine's system.
pub fn self_interaction_tensor(engine: &dyn FieldEngine) -> Result<Tensor> {
    let sys = engine.system();
    debug!("[tensor] building self-interaction tensor for {}", sys.grid);
    let demag = demag_tensor(sys, engine.demag_kernel())?;
    let exch = exchange_tensor(sys)?;
    let anis = anisotropy_tensor(sys)?;
    Tensor::sum(&[&demag, &exch, &anis])
}

/// Cache key for the aggregate tensor: system and demag kernel.
fn engine_key(engine: &dyn FieldEngine) -> (u64, u64) {
    (engine.system().fingerprint(), engine.demag_kernel().fingerprint())
}

/// Aggregate tensor handle, rebuilt only when the system or the demag kernel
/// changes, or when the caller asks for it.
#[derive(Debug, Default)]
pub struct TensorCache {
    key: Option<(u64, u64)>,
    tensor: Option<Tensor>,
    builds: usize,
}

impl TensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&mut self, engine: &dyn FieldEngine, recompute: bool) -> Result<&Tensor> {
        let key = engine_key(engine);
        if recompute || self.key != Some(key) || self.tensor.is_none() {
            self.tensor = Some(self_interaction_tensor(engine)?);
            self.key = Some(key);
            self.builds += 1;
        }
        self.tensor
            .as_ref()
            .ok_or_else(|| Error::Config("tensor cache is empty after build".to_string()))
    }

    /// Number of times the tensor has been (re)built.
    pub fn builds(&self) -> usize {
        self.builds
    }
}

/// Linear Hamiltonian handle keyed by system *and* ground state.
#[derive(Debug, Default)]
pub struct LinearHamiltonianCache {
    aggregate: TensorCache,
    key: Option<((u64, u64), u64)>,
    tensor: Option<Tensor>,
}

impl LinearHamiltonianCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &mut self,
        engine: &dyn FieldEngine,
        ground_state: &VectorField,
        recompute: bool,
    ) -> Result<&Tensor> {
        let key = (engine_key(engine), ground_state.fingerprint());
        if recompute || self.key != Some(key) || self.tensor.is_none() {
            let aggregate = self.aggregate.get_or_build(engine, recompute)?;
            self.tensor = Some(linearize(aggregate, ground_state, engine.system())?);
            self.key = Some(key);
        }
        self.tensor
            .as_ref()
            .ok_or_else(|| Error::Config("hamiltonian cache is empty after build".to_string()))
    }

    pub fn aggregate_builds(&self) -> usize {
        self.aggregate.builds()
    }
}
