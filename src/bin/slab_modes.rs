// src/bin/slab_modes.rs
//
// Slab benchmark: thin permalloy-like film with a strong in-plane bias field.
// Relaxes the ground state, solves the dense reduced problem and the
// matrix-free Arnoldi problem, and compares the low end of both spectra.
//
// Run:
//   cargo run --release --bin slab_modes [-- nx=N ny=N nev=N]
//
// Output:
//   out/slab_modes/
//     ├── config.json
//     ├── ground_state.ovf
//     └── dense_vs_arnoldi.csv

use std::env;
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;

use log::{error, info, warn};

use llg_modes::config::{RelaxConfig, RunConfig, RunInfo, SolverSettings, StrategyKind, SystemParameters};
use llg_modes::effective_field::{CpuEngine, FieldEngine};
use llg_modes::eigen::{self, compare};
use llg_modes::ovf;
use llg_modes::vector_field::VectorField;
use llg_modes::{Error, Result};

fn parse_usize(arg: &str, key: &str) -> Result<Option<usize>> {
    match arg.strip_prefix(key) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value in '{arg}'"))),
        None => Ok(None),
    }
}

fn run() -> Result<()> {
    let mut nx = 10;
    let mut ny = 10;
    let mut nev = 8;
    for arg in env::args().skip(1) {
        if let Some(v) = parse_usize(&arg, "nx=")? {
            nx = v;
        } else if let Some(v) = parse_usize(&arg, "ny=")? {
            ny = v;
        } else if let Some(v) = parse_usize(&arg, "nev=")? {
            nev = v;
        } else {
            return Err(Error::Config(format!("unrecognised argument '{arg}'")));
        }
    }

    let params = SystemParameters::slab_example(nx, ny);
    info!("[modes] slab scenario: {}", params);
    let engine = CpuEngine::new(params.to_system()?)?;

    let mut m = VectorField::uniform(params.grid(), [1.0, 0.0, 0.0]);
    let report = engine.relax(&mut m)?;
    if !report.converged {
        warn!(
            "[relax] not converged (max torque {:.3e} T); modes may be inaccurate",
            report.final_max_torque
        );
    }

    let dense_settings = SolverSettings {
        strategy: StrategyKind::Dense,
        ..SolverSettings::default()
    };
    let arnoldi_settings = SolverSettings {
        strategy: StrategyKind::Arnoldi,
        nev,
        ..SolverSettings::default()
    };
    let dense = eigen::solve(&engine, &m, &dense_settings)?;
    let arnoldi = eigen::solve(&engine, &m, &arnoldi_settings)?;

    let out_dir = Path::new("out").join("slab_modes");
    create_dir_all(&out_dir)?;
    ovf::write_vector_field(&out_dir.join("ground_state.ovf"), &m)?;

    let mut w = BufWriter::new(File::create(out_dir.join("dense_vs_arnoldi.csv"))?);
    writeln!(w, "index,arnoldi_hz,nearest_dense_hz,rel_diff")?;
    for (i, &wa) in arnoldi.frequencies.iter().enumerate() {
        let nearest = dense
            .frequencies
            .iter()
            .copied()
            .min_by(|a, b| (a - wa).abs().total_cmp(&(b - wa).abs()))
            .unwrap_or(f64::NAN);
        let rel = (nearest - wa).abs() / wa.abs().max(f64::MIN_POSITIVE);
        let to_hz = 1.0 / (2.0 * std::f64::consts::PI);
        writeln!(w, "{},{:.9e},{:.9e},{:.3e}", i, wa * to_hz, nearest * to_hz, rel)?;
    }
    w.flush()?;

    let low_dense = dense.lowest_positive_frequency();
    let low_arnoldi = arnoldi.lowest_positive_frequency();
    if let (Some(a), Some(b)) = (low_dense, low_arnoldi) {
        let rel = (a - b).abs() / a;
        info!(
            "[modes] lowest frequency: dense {:.6} GHz, arnoldi {:.6} GHz (rel diff {:.2e})",
            a / (2.0 * std::f64::consts::PI) * 1e-9,
            b / (2.0 * std::f64::consts::PI) * 1e-9,
            rel
        );
        if rel > 0.01 {
            warn!("[modes] lowest frequencies differ by more than 1%");
        }
    }
    match compare::assert_equivalent(&arnoldi, &dense, &compare::Tolerances::default()) {
        Ok(r) => info!(
            "[modes] {} Arnoldi modes match dense (max subspace residual {:.2e})",
            r.compared, r.max_subspace_residual
        ),
        Err(e) => warn!("[modes] {e}"),
    }

    let run_config = RunConfig {
        system: params,
        solver: arnoldi_settings,
        relax: RelaxConfig {
            torque_threshold: engine.relax_settings().torque_threshold,
            max_iters: engine.relax_settings().max_iters,
            iterations: report.iters,
            final_max_torque: report.final_max_torque,
        },
        run: RunInfo {
            binary: "slab_modes".to_string(),
            run_id: "slab_modes".to_string(),
            n_modes: arnoldi.len(),
            lowest_frequency_hz: low_arnoldi.map(|w| w / (2.0 * std::f64::consts::PI)),
            git_commit: None,
            timestamp_utc: None,
        },
    };
    run_config.write_to_dir(&out_dir)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
