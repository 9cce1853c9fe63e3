// src/config.rs

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::params::System;

/// Uniform system description as stored in JSON test-case files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemParameters {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub msat: f64,
    pub aex: f64,
    pub ku1: f64,
    pub anis_u: [f64; 3],
    #[serde(rename = "B_ext")]
    pub b_ext: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
}

impl SystemParameters {
    /// Thin uniformly magnetised slab with an in-plane bias field.
    pub fn slab_example(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            nz: 1,
            dx: 5e-9,
            dy: 5e-9,
            dz: 5e-9,
            msat: 16074.649,
            aex: 1.3e-12,
            ku1: 756.3,
            anis_u: [0.0, 0.0, 1.0],
            b_ext: [0.5, 0.0, 0.0],
            gamma: None,
        }
    }

    pub fn grid(&self) -> Grid3D {
        Grid3D::new(self.nx, self.ny, self.nz, self.dx, self.dy, self.dz)
    }

    /// Build the immutable [`System`], validating everything on the way.
    pub fn to_system(&self) -> Result<System> {
        let grid = self.grid();
        grid.validate()?;
        let axis_len = (self.anis_u.iter().map(|c| c * c).sum::<f64>()).sqrt();
        if self.ku1 != 0.0 && axis_len == 0.0 {
            return Err(Error::Config("AnisU must be non-zero when Ku1 != 0".to_string()));
        }
        let mut sys = System::uniform(grid, self.msat, self.aex, self.ku1, self.anis_u, self.b_ext)?;
        if let Some(g) = self.gamma {
            sys.gamma = g;
            sys.validate()?;
        }
        Ok(sys)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl std::fmt::Display for SystemParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{} Ms={} Aex={:e} Ku1={} u={:?} B={:?}",
            self.nx, self.ny, self.nz, self.msat, self.aex, self.ku1, self.anis_u, self.b_ext
        )
    }
}

/// Read a JSON array of test-case systems.
pub fn load_cases(path: &Path) -> Result<Vec<SystemParameters>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Which eigensolver strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Dense solve of the full 3N lab-frame problem.
    Straight,
    /// Dense solve of the rotated 2N problem.
    Dense,
    /// Dense Hermitian solve after Cholesky symmetrisation.
    Cholesky,
    /// Matrix-free Arnoldi driven by the field engine.
    Arnoldi,
    /// Arnoldi on the explicit reduced dynamical matrix.
    ArnoldiMatrix,
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "straight" | "full" => Ok(Self::Straight),
            "dense" | "rotated" => Ok(Self::Dense),
            "cholesky" => Ok(Self::Cholesky),
            "arnoldi" | "arnoldi-field" => Ok(Self::Arnoldi),
            "arnoldi-matrix" => Ok(Self::ArnoldiMatrix),
            _ => Err(Error::Config(format!("unknown strategy '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    pub strategy: StrategyKind,
    /// Number of modes requested from iterative strategies.
    pub nev: usize,
    pub ncv: Option<usize>,
    pub which: String,
    pub tol: f64,
    pub max_iterations: usize,
    pub timeout_s: Option<f64>,
    pub seed: u64,
    /// Strategy to fall back to when the requested one fails.
    pub fallback: Option<StrategyKind>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Dense,
            nev: 6,
            ncv: None,
            which: "SM".to_string(),
            tol: 0.0,
            max_iterations: 300,
            timeout_s: None,
            seed: 0,
            fallback: None,
        }
    }
}

#[derive(Serialize)]
pub struct RunConfig {
    pub system: SystemParameters,
    pub solver: SolverSettings,
    pub relax: RelaxConfig,
    pub run: RunInfo,
}

#[derive(Serialize)]
pub struct RelaxConfig {
    pub torque_threshold: f64,
    pub max_iters: usize,
    pub iterations: usize,
    pub final_max_torque: f64,
}

#[derive(Serialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,
    pub n_modes: usize,
    pub lowest_frequency_hz: Option<f64>,

    // Optional provenance (can be filled later)
    pub git_commit: Option<String>,
    pub timestamp_utc: Option<String>,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
