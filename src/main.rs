// src/main.rs
//
// Command-line driver: relax a uniform system, solve for its spin-wave modes
// and write the results.
//
// Outputs from this driver are written to `runs/` (or the directory
// specified via `out=`) and are not committed to version control.
//
// Examples:
//
//   cargo run --release -- strategy=dense
//       -> built-in slab scenario, dense reduced solve, every mode exported.
//
//   cargo run --release -- params=case.json strategy=arnoldi nev=10 which=SM \
//         fallback=dense plot
//       -> matrix-free Arnoldi for the 10 smallest |lambda|, falling back to
//          the dense solve if Arnoldi fails, plus a spectrum plot.
//
// Typical outputs (per run directory):
//   runs/<run_id>/
//     ├── config.json
//     ├── ground_state.ovf
//     ├── frequencies.csv
//     ├── mode_XXXX_re.ovf / mode_XXXX_im.ovf
//     └── spectrum.png            (if `plot` is enabled)

use std::env;
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info, warn};

use llg_modes::config::{
    RelaxConfig, RunConfig, RunInfo, SolverSettings, StrategyKind, SystemParameters,
};
use llg_modes::effective_field::{CpuEngine, FieldEngine};
use llg_modes::eigen;
use llg_modes::minimize::{uniform_ground_state, MinimizeSettings};
use llg_modes::ovf;
use llg_modes::vec3::norm;
use llg_modes::vector_field::VectorField;
use llg_modes::visualisation::save_spectrum_plot;
use llg_modes::{Error, Result};

fn print_usage() {
    eprintln!(
        r#"Usage:
  cargo run -- [params=FILE.json] [strategy=dense|straight|cholesky|arnoldi|arnoldi-matrix]
             [nev=N] [ncv=N] [which=SM|LM|SR|LR|SI|LI] [tol=VAL] [maxiter=N]
             [timeout=SECONDS] [seed=N] [fallback=STRATEGY]
             [relax_tol=TESLA] [out=DIR] [run=RUN_ID] [uniform] [plot]

Notes:
  - Without params=, the built-in 10x10x1 slab scenario is used.
  - The ground state starts along the applied field (or the easy axis when
    the field is zero) and is relaxed before the modes are computed. With
    `uniform`, it starts from the macrospin ground state instead.
  - nev/ncv/which/tol/maxiter/timeout/seed only affect the Arnoldi strategies.
  - Set RUST_LOG=debug for per-iteration progress.
"#
    );
}

fn sanitize_run_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn default_run_id(strategy: StrategyKind) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    let ts = format!("{}{:03}", now.as_secs(), now.subsec_millis());
    format!("{}_{:?}", ts, strategy).to_lowercase()
}

fn unique_run_dir(out_root: &str, run_id: &str) -> PathBuf {
    let base = PathBuf::from(out_root);
    let mut dir = base.join(run_id);
    if !dir.exists() {
        return dir;
    }
    for k in 1..1000 {
        let cand = base.join(format!("{}_{}", run_id, k));
        if !cand.exists() {
            dir = cand;
            break;
        }
    }
    dir
}

fn parse<T: std::str::FromStr>(key: &str, v: &str) -> Result<T> {
    v.parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: '{v}'")))
}

struct Cli {
    params: Option<PathBuf>,
    solver: SolverSettings,
    relax: MinimizeSettings,
    out_root: String,
    run_id: Option<String>,
    uniform_start: bool,
    plot: bool,
}

/// `None` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Cli>> {
    let mut cli = Cli {
        params: None,
        solver: SolverSettings::default(),
        relax: MinimizeSettings::default(),
        out_root: "runs".to_string(),
        run_id: None,
        uniform_start: false,
        plot: false,
    };

    for arg in args {
        if arg == "-h" || arg == "--help" || arg == "help" {
            return Ok(None);
        }
        if arg == "plot" {
            cli.plot = true;
            continue;
        }
        if arg == "uniform" {
            cli.uniform_start = true;
            continue;
        }
        let Some((key, v)) = arg.split_once('=') else {
            return Err(Error::Config(format!("unrecognised argument '{arg}'")));
        };
        match key {
            "params" => cli.params = Some(PathBuf::from(v)),
            "strategy" => cli.solver.strategy = v.parse()?,
            "fallback" => cli.solver.fallback = Some(v.parse()?),
            "nev" => cli.solver.nev = parse(key, v)?,
            "ncv" => cli.solver.ncv = Some(parse(key, v)?),
            "which" => cli.solver.which = v.to_string(),
            "tol" => cli.solver.tol = parse(key, v)?,
            "maxiter" => cli.solver.max_iterations = parse(key, v)?,
            "timeout" => cli.solver.timeout_s = Some(parse(key, v)?),
            "seed" => cli.solver.seed = parse(key, v)?,
            "relax_tol" => cli.relax.torque_threshold = parse(key, v)?,
            "out" => cli.out_root = v.to_string(),
            "run" => cli.run_id = Some(sanitize_run_id(v)),
            _ => return Err(Error::Config(format!("unknown key '{key}'"))),
        }
    }
    Ok(Some(cli))
}

/// Uniform start along the applied field, or the easy axis without one.
fn initial_state(params: &SystemParameters) -> VectorField {
    let dir = if norm(params.b_ext) > 0.0 {
        params.b_ext
    } else if norm(params.anis_u) > 0.0 {
        params.anis_u
    } else {
        [0.0, 0.0, 1.0]
    };
    let mut m = VectorField::uniform(params.grid(), dir);
    m.normalize();
    m
}

fn run(cli: Cli) -> Result<()> {
    let params = match &cli.params {
        Some(path) => SystemParameters::load(path)?,
        None => SystemParameters::slab_example(10, 10),
    };
    info!("[modes] system: {}", params);
    let engine = CpuEngine::new(params.to_system()?)?.with_relax_settings(cli.relax.clone());

    let mut m = if cli.uniform_start {
        uniform_ground_state(&engine, engine.relax_settings())?
    } else {
        initial_state(&params)
    };
    let report = engine.relax(&mut m)?;
    if report.converged {
        info!(
            "[relax] converged after {} iterations (max torque {:.3e} T)",
            report.iters, report.final_max_torque
        );
    } else {
        warn!(
            "[relax] not converged after {} iterations (max torque {:.3e} T); continuing",
            report.iters, report.final_max_torque
        );
    }

    let modes = eigen::solve(&engine, &m, &cli.solver)?;
    let lowest = modes.lowest_positive_frequency();
    match lowest {
        Some(w) => info!(
            "[modes] {} modes, lowest positive frequency {:.6} GHz",
            modes.len(),
            w / (2.0 * std::f64::consts::PI) * 1e-9
        ),
        None => warn!("[modes] no positive-frequency mode found"),
    }

    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(cli.solver.strategy));
    create_dir_all(&cli.out_root)?;
    let run_dir = unique_run_dir(&cli.out_root, &run_id);
    create_dir_all(&run_dir)?;

    ovf::write_vector_field(&run_dir.join("ground_state.ovf"), &m)?;
    let exported = ovf::write_modes(&run_dir, &modes)?;
    if cli.plot {
        save_spectrum_plot(&modes, &run_dir.join("spectrum.png"))?;
    }

    let run_config = RunConfig {
        system: params,
        solver: cli.solver,
        relax: RelaxConfig {
            torque_threshold: engine.relax_settings().torque_threshold,
            max_iters: engine.relax_settings().max_iters,
            iterations: report.iters,
            final_max_torque: report.final_max_torque,
        },
        run: RunInfo {
            binary: "llg-modes".to_string(),
            run_id,
            n_modes: modes.len(),
            lowest_frequency_hz: lowest.map(|w| w / (2.0 * std::f64::consts::PI)),
            git_commit: None,
            timestamp_utc: None,
        },
    };
    run_config.write_to_dir(&run_dir)?;
    info!(
        "[modes] wrote {} mode pair(s) to {}",
        exported,
        run_dir.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("{e}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
