// src/effective_field/mod.rs
//
// Field-evaluation engine boundary.
//
// NOTE: all fields are effective inductions B (Tesla). Every routine takes the
// magnetisation buffer as an explicit argument and only ever *adds* into the
// destination, so the caller's configuration is never touched.
pub mod anisotropy;
pub mod demag;
pub mod exchange;
pub mod zeeman;

use log::info;

use crate::error::Result;
use crate::minimize::{minimize, MinimizeReport, MinimizeSettings};
use crate::params::System;
use crate::vec3::{cross, dot, norm};
use crate::vector_field::VectorField;

pub use demag::{DemagConvolution, DemagKernel};

/// Micromagnetic field engine consumed by the tensor builders and the
/// matrix-free eigensolver.
pub trait FieldEngine: Sync {
    fn system(&self) -> &System;

    /// Real-space demag kernel for the engine's grid.
    fn demag_kernel(&self) -> &DemagKernel;

    fn add_demag_field(&self, m: &VectorField, dst: &mut VectorField) -> Result<()>;

    fn add_exchange_field(&self, m: &VectorField, dst: &mut VectorField) -> Result<()>;

    fn add_anisotropy_field(&self, m: &VectorField, dst: &mut VectorField) -> Result<()>;

    fn add_zeeman_field(&self, dst: &mut VectorField) -> Result<()> {
        zeeman::add_zeeman_field(self.system(), dst)
    }

    /// Demag + exchange + anisotropy. Linear in `m`.
    fn add_self_interaction_field(&self, m: &VectorField, dst: &mut VectorField) -> Result<()> {
        self.add_demag_field(m, dst)?;
        self.add_exchange_field(m, dst)?;
        self.add_anisotropy_field(m, dst)
    }

    /// Full effective induction B_eff = B_si(m) + B_ext.
    fn effective_field(&self, m: &VectorField) -> Result<VectorField> {
        let mut b = VectorField::zeros(self.system().grid);
        self.add_self_interaction_field(m, &mut b)?;
        self.add_zeeman_field(&mut b)?;
        Ok(b)
    }

    fn demag_energy(&self, m: &VectorField) -> Result<f64> {
        let mut b = VectorField::zeros(self.system().grid);
        self.add_demag_field(m, &mut b)?;
        Ok(self_energy(self.system(), m, &b))
    }

    fn exchange_energy(&self, m: &VectorField) -> Result<f64> {
        let mut b = VectorField::zeros(self.system().grid);
        self.add_exchange_field(m, &mut b)?;
        Ok(self_energy(self.system(), m, &b))
    }

    fn anisotropy_energy(&self, m: &VectorField) -> Result<f64> {
        let mut b = VectorField::zeros(self.system().grid);
        self.add_anisotropy_field(m, &mut b)?;
        Ok(self_energy(self.system(), m, &b))
    }

    /// -sum Ms m·B_ext V
    fn zeeman_energy(&self, m: &VectorField) -> Result<f64> {
        let sys = self.system();
        m.ensure_grid(&sys.grid, "zeeman energy")?;
        let e: f64 = (0..sys.n_cells())
            .map(|r| sys.ms(r) * dot(m.data[r], sys.b_ext.data[r]))
            .sum();
        Ok(-e * sys.cell_volume())
    }

    fn total_energy(&self, m: &VectorField) -> Result<f64> {
        Ok(self.demag_energy(m)?
            + self.exchange_energy(m)?
            + self.anisotropy_energy(m)?
            + self.zeeman_energy(m)?)
    }

    /// max |m × B_eff| over magnetic cells (Tesla).
    fn max_torque(&self, m: &VectorField) -> Result<f64> {
        let b = self.effective_field(m)?;
        let sys = self.system();
        Ok((0..sys.n_cells())
            .filter(|&r| sys.ms(r) != 0.0)
            .map(|r| norm(cross(m.data[r], b.data[r])))
            .fold(0.0, f64::max))
    }

    /// Relax `m` towards the nearest equilibrium.
    fn relax(&self, m: &mut VectorField) -> Result<MinimizeReport> {
        minimize(self, m, &MinimizeSettings::default())
    }
}

/// Energy of a field that is linear in m: E = -1/2 sum Ms m·B V.
fn self_energy(sys: &System, m: &VectorField, b: &VectorField) -> f64 {
    let e: f64 = (0..sys.n_cells())
        .map(|r| sys.ms(r) * dot(m.data[r], b.data[r]))
        .sum();
    -0.5 * e * sys.cell_volume()
}

/// Reference CPU engine: FFT demag, nearest-neighbour exchange, uniaxial anisotropy.
pub struct CpuEngine {
    system: System,
    kernel: DemagKernel,
    conv: DemagConvolution,
    relax_settings: MinimizeSettings,
}

impl CpuEngine {
    pub fn new(system: System) -> Result<Self> {
        system.validate()?;
        let kernel = DemagKernel::new(system.grid)?;
        Ok(Self::with_kernel(system, kernel))
    }

    /// Reuse a kernel computed for the same grid.
    pub fn with_kernel(system: System, kernel: DemagKernel) -> Self {
        info!("[demag] FFT convolution ready for {}", system.grid);
        let conv = DemagConvolution::new(&kernel);
        Self {
            system,
            kernel,
            conv,
            relax_settings: MinimizeSettings::default(),
        }
    }

    pub fn with_relax_settings(mut self, settings: MinimizeSettings) -> Self {
        self.relax_settings = settings;
        self
    }

    pub fn relax_settings(&self) -> &MinimizeSettings {
        &self.relax_settings
    }
}

impl FieldEngine for CpuEngine {
    fn system(&self) -> &System {
        &self.system
    }

    fn demag_kernel(&self) -> &DemagKernel {
        &self.kernel
    }

    fn add_demag_field(&self, m: &VectorField, dst: &mut VectorField) -> Result<()> {
        self.conv.add_field(m, &self.system.material.ms, dst)
    }

    fn add_exchange_field(&self, m: &VectorField, dst: &mut VectorField) -> Result<()> {
        exchange::add_exchange_field(&self.system, m, dst)
    }

    fn add_anisotropy_field(&self, m: &VectorField, dst: &mut VectorField) -> Result<()> {
        anisotropy::add_uniaxial_anisotropy_field(&self.system, m, dst)
    }

    fn relax(&self, m: &mut VectorField) -> Result<MinimizeReport> {
        minimize(self, m, &self.relax_settings)
    }
}
