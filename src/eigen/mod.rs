// src/eigen/mod.rs
//
// Eigensolver strategies for the linearised dynamics about a ground state.
//
// Every strategy returns a `ModeSet`: eigenvalues lambda = i*omega of the
// dynamical matrix, the angular frequencies omega = Im(lambda) in rad/s, and
// unit-norm lab-frame mode profiles (3 components per cell).
pub mod arnoldi;
pub mod cholesky;
pub mod compare;
pub mod dense;
pub mod krylov;

use std::time::Duration;

use log::{info, warn};
use num_complex::Complex64;

use crate::complex_field::ComplexField;
use crate::config::{SolverSettings, StrategyKind};
use crate::effective_field::FieldEngine;
use crate::error::{Error, Result};
use crate::vector_field::VectorField;

pub use arnoldi::{Arnoldi, ArnoldiConfig, ArnoldiError, Ido, RitzPairs, Which};
pub use cholesky::CholeskyFirst;
pub use dense::{RotatedToZ, Straight};
pub use krylov::{ArnoldiField, ArnoldiMatrix};

#[derive(Debug, Clone, Default)]
pub struct ModeSet {
    pub eigenvalues: Vec<Complex64>,
    /// Angular frequencies (rad/s).
    pub frequencies: Vec<f64>,
    /// Lab-frame profiles, 3 components per cell, unit norm.
    pub modes: Vec<ComplexField>,
    /// Reduced-frame (2-component) profiles, when the strategy works in that frame.
    pub reduced: Option<Vec<ComplexField>>,
}

impl ModeSet {
    pub fn new(
        eigenvalues: Vec<Complex64>,
        modes: Vec<ComplexField>,
        reduced: Option<Vec<ComplexField>>,
    ) -> Result<Self> {
        if eigenvalues.len() != modes.len() {
            return Err(Error::shape("mode set", eigenvalues.len(), modes.len()));
        }
        if let Some(r) = &reduced {
            if r.len() != modes.len() {
                return Err(Error::shape("reduced mode set", modes.len(), r.len()));
            }
        }
        let frequencies = eigenvalues.iter().map(|l| l.im).collect();
        let mut set = Self {
            eigenvalues,
            frequencies,
            modes,
            reduced,
        };
        compare::sort_by_frequency(&mut set);
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Frequency of mode `i` in Hz.
    pub fn frequency_hz(&self, i: usize) -> f64 {
        self.frequencies[i] / (2.0 * std::f64::consts::PI)
    }

    /// Smallest strictly positive angular frequency.
    pub fn lowest_positive_frequency(&self) -> Option<f64> {
        self.frequencies.iter().copied().find(|&w| w > 0.0)
    }

    /// Indices of the modes with positive frequency.
    pub fn positive(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.frequencies[i] > 0.0).collect()
    }
}

pub trait EigenSolver {
    fn name(&self) -> &'static str;

    /// Normal modes about `ground_state` for the engine's system.
    fn modes(&mut self, engine: &dyn FieldEngine, ground_state: &VectorField) -> Result<ModeSet>;
}

/// Build the strategy named in `settings`.
pub fn solver_for(kind: StrategyKind, settings: &SolverSettings) -> Result<Box<dyn EigenSolver>> {
    Ok(match kind {
        StrategyKind::Straight => Box::new(Straight::new()),
        StrategyKind::Dense => Box::new(RotatedToZ::new()),
        StrategyKind::Cholesky => Box::new(CholeskyFirst::new()),
        StrategyKind::Arnoldi => Box::new(ArnoldiField::new(arnoldi_config(settings)?)),
        StrategyKind::ArnoldiMatrix => Box::new(ArnoldiMatrix::new(arnoldi_config(settings)?)),
    })
}

pub fn arnoldi_config(settings: &SolverSettings) -> Result<ArnoldiConfig> {
    let which: Which = settings.which.parse()?;
    let mut cfg = ArnoldiConfig::new(settings.nev)
        .with_which(which)
        .with_tol(settings.tol)
        .with_max_iterations(settings.max_iterations)
        .with_seed(settings.seed);
    cfg.ncv = settings.ncv;
    if let Some(secs) = settings.timeout_s {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(Error::Config(format!("timeout must be positive, got {secs}")));
        }
        cfg = cfg.with_timeout(Duration::from_secs_f64(secs));
    }
    Ok(cfg)
}

/// Run the configured strategy; on failure, run the fallback strategy once
/// if one is configured.
pub fn solve(
    engine: &dyn FieldEngine,
    ground_state: &VectorField,
    settings: &SolverSettings,
) -> Result<ModeSet> {
    let mut solver = solver_for(settings.strategy, settings)?;
    info!("[modes] solving with strategy '{}'", solver.name());
    match solver.modes(engine, ground_state) {
        Ok(set) => Ok(set),
        Err(e) => match settings.fallback {
            Some(kind) if kind != settings.strategy => {
                warn!(
                    "[modes] strategy '{}' failed ({}); falling back to {:?}",
                    solver.name(),
                    e,
                    kind
                );
                solver_for(kind, settings)?.modes(engine, ground_state)
            }
            _ => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;

    #[test]
    fn mode_set_is_sorted_by_frequency() {
        let grid = Grid3D::new(1, 1, 1, 1.0, 1.0, 1.0);
        let ev = vec![
            Complex64::new(0.0, 3.0),
            Complex64::new(0.0, -1.0),
            Complex64::new(0.0, 1.0),
        ];
        let modes = (0..3).map(|s| ComplexField::random(3, grid, s)).collect();
        let set = ModeSet::new(ev, modes, None).unwrap();
        assert_eq!(set.frequencies, vec![-1.0, 1.0, 3.0]);
        assert_eq!(set.lowest_positive_frequency(), Some(1.0));
        assert_eq!(set.positive(), vec![1, 2]);
        assert!((set.frequency_hz(2) - 3.0 / (2.0 * std::f64::consts::PI)).abs() < 1e-15);
    }

    #[test]
    fn unknown_selection_is_a_config_error() {
        let settings = SolverSettings {
            which: "middle".to_string(),
            ..SolverSettings::default()
        };
        assert!(matches!(arnoldi_config(&settings), Err(Error::Config(_))));
    }
}
