// src/minimize.rs
//
// Ground-state relaxation by projected steepest descent with
// Barzilai–Borwein step sizes (MuMax-style minimiser).
// One effective-field build per iteration.
//
// Descent direction: d = (m × B) × m = B - m (m·B)
// Update:            m <- normalize(m + tau d)
// Step size:         alternating BB1 / BB2 from s = m_k - m_{k-1}, y = d_{k-1} - d_k
//
// Stop: max |m × B| < torque_threshold (Tesla)
//
// `UniformModel` is the same descent for a single direction shared by every
// magnetic cell (macrospin approximation of the whole sample).

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::effective_field::FieldEngine;
use crate::error::{Error, Result};
use crate::vec3::{cross, dot, madd, mat_vec, norm, normalize, Mat3};
use crate::vector_field::VectorField;

#[derive(Debug, Clone)]
pub struct MinimizeSettings {
    pub torque_threshold: f64, // Tesla
    pub max_iters: usize,

    /// Largest rotation (rad) allowed in the very first step.
    pub first_step: f64,
    /// Bounds on the step size tau (1/T).
    pub tau_min: f64,
    pub tau_max: f64,

    /// Enable Rayon parallelism for the per-cell update pass.
    pub parallel: bool,

    // Optional: log every N iterations (0 disables)
    pub print_every: usize,
}

impl Default for MinimizeSettings {
    fn default() -> Self {
        Self {
            torque_threshold: 1e-7,
            max_iters: 50_000,
            first_step: 1e-3,
            tau_min: 1e-12,
            tau_max: 1e3,
            parallel: false,
            print_every: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MinimizeReport {
    pub iters: usize,
    pub converged: bool,
    pub final_max_torque: f64,
    pub final_energy: f64,
}

fn descent(m: &[[f64; 3]], b: &[[f64; 3]], ms: &[f64]) -> Vec<[f64; 3]> {
    m.iter()
        .zip(b)
        .zip(ms)
        .map(|((mi, bi), &msi)| {
            if msi == 0.0 {
                [0.0; 3]
            } else {
                madd(*bi, *mi, -dot(*mi, *bi))
            }
        })
        .collect()
}

fn max_torque(m: &[[f64; 3]], b: &[[f64; 3]], ms: &[f64]) -> f64 {
    m.iter()
        .zip(b)
        .zip(ms)
        .filter(|(_, &msi)| msi != 0.0)
        .map(|((mi, bi), _)| norm(cross(*mi, *bi)))
        .fold(0.0, f64::max)
}

/// Relax `m` in place. Returns a report rather than failing when the
/// iteration budget runs out; callers decide whether that is acceptable.
pub fn minimize<E: FieldEngine + ?Sized>(
    engine: &E,
    m: &mut VectorField,
    settings: &MinimizeSettings,
) -> Result<MinimizeReport> {
    let sys = engine.system();
    m.ensure_grid(&sys.grid, "relaxation state")?;
    let ms = &sys.material.ms;
    m.normalize();

    let mut b = engine.effective_field(m)?;
    let mut d = descent(&m.data, &b.data, ms);
    let mut torque = max_torque(&m.data, &b.data, ms);

    let d_max = d.iter().map(|v| norm(*v)).fold(0.0, f64::max);
    let mut tau = if d_max > 0.0 {
        (settings.first_step / d_max).clamp(settings.tau_min, settings.tau_max)
    } else {
        settings.tau_min
    };

    let mut iters = 0;
    while torque >= settings.torque_threshold && iters < settings.max_iters {
        let m_prev = m.data.clone();
        let d_prev = std::mem::take(&mut d);

        let step = |(mi, di): (&mut [f64; 3], &[f64; 3])| {
            *mi = normalize(madd(*mi, *di, tau));
        };
        if settings.parallel {
            m.data.par_iter_mut().zip(d_prev.par_iter()).for_each(step);
        } else {
            m.data.iter_mut().zip(d_prev.iter()).for_each(step);
        }

        b = engine.effective_field(m)?;
        d = descent(&m.data, &b.data, ms);
        torque = max_torque(&m.data, &b.data, ms);
        iters += 1;

        // Barzilai–Borwein; the gradient is -d.
        let mut ss = 0.0;
        let mut sy = 0.0;
        let mut yy = 0.0;
        for r in 0..m.data.len() {
            for c in 0..3 {
                let s = m.data[r][c] - m_prev[r][c];
                let y = d_prev[r][c] - d[r][c];
                ss += s * s;
                sy += s * y;
                yy += y * y;
            }
        }
        let candidate = if iters % 2 == 0 { ss / sy } else { sy / yy };
        if candidate.is_finite() && candidate > 0.0 {
            tau = candidate.clamp(settings.tau_min, settings.tau_max);
        }

        if settings.print_every > 0 && iters % settings.print_every == 0 {
            debug!("[relax] iter {:>6}  max torque {:.3e} T  tau {:.3e}", iters, torque, tau);
        }
    }

    let converged = torque < settings.torque_threshold;
    let final_energy = engine.total_energy(m)?;
    if converged {
        info!(
            "[relax] converged after {} iterations (max torque {:.3e} T, E = {:.6e} J)",
            iters, torque, final_energy
        );
    } else {
        warn!(
            "[relax] stopped after {} iterations with max torque {:.3e} T",
            iters, torque
        );
    }

    Ok(MinimizeReport {
        iters,
        converged,
        final_max_torque: torque,
        final_energy,
    })
}

/// Magnetisation assumed uniform over the sample: the self-interaction field
/// collapses to a 3x3 matrix and the applied field to its mean, both
/// weighted by Ms.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformModel {
    /// Mean self-interaction field (T) per unit magnetisation direction.
    pub self_field: Mat3,
    /// Mean applied field (T).
    pub b_ext: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct UniformReport {
    pub m: [f64; 3],
    pub iters: usize,
    pub converged: bool,
    pub final_torque: f64,
    /// Energy per unit magnetisation (T), see [`UniformModel::energy`].
    pub final_energy: f64,
}

impl UniformModel {
    /// Probe the engine with uniform states along x, y and z.
    pub fn from_engine<E: FieldEngine + ?Sized>(engine: &E) -> Result<Self> {
        let sys = engine.system();
        let ms = &sys.material.ms;
        let total_ms: f64 = ms.iter().sum();
        if total_ms <= 0.0 {
            return Err(Error::Degenerate(
                "uniform model needs at least one magnetic cell".to_string(),
            ));
        }

        let mean = |b: &VectorField| -> [f64; 3] {
            let mut acc = [0.0; 3];
            for (v, &w) in b.data.iter().zip(ms) {
                acc = madd(acc, *v, w / total_ms);
            }
            acc
        };

        let mut self_field = [[0.0; 3]; 3];
        for axis in 0..3 {
            let mut dir = [0.0; 3];
            dir[axis] = 1.0;
            let m = VectorField::uniform(sys.grid, dir);
            let mut b = VectorField::zeros(sys.grid);
            engine.add_self_interaction_field(&m, &mut b)?;
            let col = mean(&b);
            for c in 0..3 {
                self_field[c][axis] = col[c];
            }
        }

        Ok(Self {
            self_field,
            b_ext: mean(&sys.b_ext),
        })
    }

    pub fn field(&self, m: [f64; 3]) -> [f64; 3] {
        madd(mat_vec(&self.self_field, m), self.b_ext, 1.0)
    }

    /// -(m·N m / 2 + m·B_ext): the energy density divided by the mean Ms.
    pub fn energy(&self, m: [f64; 3]) -> f64 {
        -(0.5 * dot(m, mat_vec(&self.self_field, m)) + dot(m, self.b_ext))
    }

    /// Barzilai–Borwein descent of a single direction from `start`.
    pub fn relax(&self, start: [f64; 3], settings: &MinimizeSettings) -> Result<UniformReport> {
        if !(norm(start).is_finite() && norm(start) > 0.0) {
            return Err(Error::Config(format!("invalid uniform start direction {start:?}")));
        }
        let mut m = normalize(start);
        let descent = |m: [f64; 3]| {
            let b = self.field(m);
            (madd(b, m, -dot(m, b)), norm(cross(m, b)))
        };

        let (mut d, mut torque) = descent(m);
        let mut tau = if norm(d) > 0.0 {
            (settings.first_step / norm(d)).clamp(settings.tau_min, settings.tau_max)
        } else {
            settings.tau_min
        };

        let mut iters = 0;
        while torque >= settings.torque_threshold && iters < settings.max_iters {
            let m_prev = m;
            let d_prev = d;
            m = normalize(madd(m, d, tau));
            (d, torque) = descent(m);
            iters += 1;

            let s = madd(m, m_prev, -1.0);
            let y = madd(d_prev, d, -1.0);
            let candidate = if iters % 2 == 0 {
                dot(s, s) / dot(s, y)
            } else {
                dot(s, y) / dot(y, y)
            };
            if candidate.is_finite() && candidate > 0.0 {
                tau = candidate.clamp(settings.tau_min, settings.tau_max);
            }
        }

        Ok(UniformReport {
            m,
            iters,
            converged: torque < settings.torque_threshold,
            final_torque: torque,
            final_energy: self.energy(m),
        })
    }

    /// Lowest-energy converged direction over a few starts: along the mean
    /// applied field, along each easy direction of the model, and one seeded
    /// random direction.
    pub fn ground_state(&self, settings: &MinimizeSettings, seed: u64) -> Result<UniformReport> {
        let mut rng = StdRng::seed_from_u64(seed);
        let random = [
            rng.gen::<f64>() - 0.5,
            rng.gen::<f64>() - 0.5,
            rng.gen::<f64>() - 0.5,
        ];
        let mut starts = vec![random];
        if norm(self.b_ext) > 0.0 {
            starts.push(self.b_ext);
        }
        for axis in 0..3 {
            let mut dir = [0.0; 3];
            dir[axis] = 1.0;
            starts.push(dir);
            dir[axis] = -1.0;
            starts.push(dir);
        }

        let mut best: Option<UniformReport> = None;
        for start in starts {
            if norm(start) == 0.0 {
                continue;
            }
            let report = self.relax(start, settings)?;
            let better = match &best {
                None => true,
                Some(b) => {
                    (report.converged && !b.converged)
                        || (report.converged == b.converged && report.final_energy < b.final_energy)
                }
            };
            if better {
                best = Some(report);
            }
        }
        let best = best.ok_or_else(|| Error::Degenerate("no uniform start direction".to_string()))?;
        debug!(
            "[relax] uniform ground state {:?} after {} iterations (torque {:.3e} T)",
            best.m, best.iters, best.final_torque
        );
        Ok(best)
    }
}

/// Uniform ground state of the whole sample, spread over every cell.
pub fn uniform_ground_state<E: FieldEngine + ?Sized>(
    engine: &E,
    settings: &MinimizeSettings,
) -> Result<VectorField> {
    let model = UniformModel::from_engine(engine)?;
    let report = model.ground_state(settings, 0)?;
    if !report.converged {
        warn!(
            "[relax] uniform model not converged (torque {:.3e} T)",
            report.final_torque
        );
    }
    Ok(VectorField::uniform(engine.system().grid, report.m))
}
