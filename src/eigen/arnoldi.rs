// src/eigen/arnoldi.rs
//
// Implicitly restarted Arnoldi iteration in complex arithmetic, driven by
// reverse communication: the solver never sees the operator, it asks the
// caller for products y = A x one at a time.
//
//   let mut arn = Arnoldi::new(n_comp, grid, config)?;
//   while let Ido::ApplyOperator = arn.iterate()? {
//       let (x, y) = arn.operands();
//       op.apply(x, y)?;
//   }
//   let pairs = arn.extract()?;
//
// Restarts use exact shifts (the unwanted Ritz values). Orthogonalisation is
// classical Gram-Schmidt with one DGKS correction.

use std::cmp::Ordering;
use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{debug, info};
use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::complex_field::ComplexField;
use crate::eigen::dense::schur_eigendecompose;
use crate::Error;
use crate::grid::Grid3D;

const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };

/// DGKS criterion: reorthogonalise when more than ~30% of the norm was removed.
const DGKS_ETA: f64 = 0.717;

/// Attempts at drawing a random vector orthogonal to the basis after breakdown.
const RANDOM_RESTART_ATTEMPTS: u64 = 3;

/// Failure codes, numbered like ARPACK's `info`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArnoldiError {
    #[error("maximum number of iterations ({iterations}) reached with {converged} converged Ritz value(s)")]
    MaxIterations { iterations: usize, converged: usize },

    #[error("invalid problem dimension {0}")]
    InvalidDimension(usize),

    #[error("nev = {nev} must satisfy 0 < nev < n = {n}")]
    InvalidNev { nev: usize, n: usize },

    #[error("ncv = {ncv} must satisfy nev + 2 <= ncv <= n (nev = {nev}, n = {n})")]
    InvalidNcv { ncv: usize, nev: usize, n: usize },

    #[error("max_iterations must be positive")]
    InvalidMaxIterations,

    #[error("tolerance {0} must be finite and non-negative")]
    InvalidTolerance(f64),

    #[error("eigendecomposition of the projected Hessenberg matrix failed")]
    RitzDecomposition,

    #[error("starting vector is zero or lies in the current Krylov subspace")]
    ZeroStartVector,

    #[error("no Ritz values converged")]
    NoConvergedValues,

    #[error("timed out after {elapsed:?} ({iterations} iterations)")]
    Timeout { elapsed: Duration, iterations: usize },

    #[error("reverse-communication protocol violated: {0}")]
    Protocol(String),
}

/// Field arithmetic only fails on mismatched buffers, which can only come
/// from a caller swapping the product buffer.
impl From<Error> for ArnoldiError {
    fn from(e: Error) -> Self {
        ArnoldiError::Protocol(e.to_string())
    }
}

impl ArnoldiError {
    pub fn code(&self) -> i32 {
        match self {
            ArnoldiError::MaxIterations { .. } => 1,
            ArnoldiError::InvalidDimension(_) => -1,
            ArnoldiError::InvalidNev { .. } => -2,
            ArnoldiError::InvalidNcv { .. } => -3,
            ArnoldiError::InvalidMaxIterations => -4,
            ArnoldiError::InvalidTolerance(_) => -5,
            ArnoldiError::RitzDecomposition => -8,
            ArnoldiError::ZeroStartVector => -9,
            ArnoldiError::NoConvergedValues => -14,
            ArnoldiError::Timeout { .. } => -100,
            ArnoldiError::Protocol(_) => -101,
        }
    }
}

/// Which end of the spectrum is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Which {
    LargestMagnitude,
    #[default]
    SmallestMagnitude,
    LargestReal,
    SmallestReal,
    LargestImag,
    SmallestImag,
}

impl FromStr for Which {
    type Err = Error;

    /// ARPACK names, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "LM" => Ok(Which::LargestMagnitude),
            "SM" => Ok(Which::SmallestMagnitude),
            "LR" => Ok(Which::LargestReal),
            "SR" => Ok(Which::SmallestReal),
            "LI" => Ok(Which::LargestImag),
            "SI" => Ok(Which::SmallestImag),
            _ => Err(Error::Config(format!(
                "unknown eigenvalue selection '{s}'"
            ))),
        }
    }
}

impl Which {
    pub fn as_str(&self) -> &'static str {
        match self {
            Which::LargestMagnitude => "LM",
            Which::SmallestMagnitude => "SM",
            Which::LargestReal => "LR",
            Which::SmallestReal => "SR",
            Which::LargestImag => "LI",
            Which::SmallestImag => "SI",
        }
    }

    /// Ordering that puts wanted values first. Ties are broken by the
    /// imaginary part, then the real part, so the order is deterministic.
    pub fn compare(&self, a: Complex64, b: Complex64) -> Ordering {
        let primary = match self {
            Which::LargestMagnitude => b.norm().total_cmp(&a.norm()),
            Which::SmallestMagnitude => a.norm().total_cmp(&b.norm()),
            Which::LargestReal => b.re.total_cmp(&a.re),
            Which::SmallestReal => a.re.total_cmp(&b.re),
            Which::LargestImag => b.im.total_cmp(&a.im),
            Which::SmallestImag => a.im.total_cmp(&b.im),
        };
        primary
            .then_with(|| b.im.total_cmp(&a.im))
            .then_with(|| b.re.total_cmp(&a.re))
    }
}

#[derive(Debug, Clone)]
pub struct ArnoldiConfig {
    pub nev: usize,
    /// Krylov basis size; `None` means max(2 nev + 1, 20) capped at n.
    pub ncv: Option<usize>,
    pub which: Which,
    /// Relative accuracy of the Ritz values; 0 means machine epsilon.
    pub tol: f64,
    /// Maximum number of implicit restarts.
    pub max_iterations: usize,
    pub timeout: Option<Duration>,
    pub seed: u64,
    pub start: Option<ComplexField>,
}

impl ArnoldiConfig {
    pub fn new(nev: usize) -> Self {
        Self {
            nev,
            ncv: None,
            which: Which::default(),
            tol: 0.0,
            max_iterations: 300,
            timeout: None,
            seed: 0,
            start: None,
        }
    }

    pub fn with_ncv(mut self, ncv: usize) -> Self {
        self.ncv = Some(ncv);
        self
    }

    pub fn with_which(mut self, which: Which) -> Self {
        self.which = which;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_start(mut self, start: ComplexField) -> Self {
        self.start = Some(start);
        self
    }
}

/// Request returned by [`Arnoldi::iterate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ido {
    /// Fill `y = A x` from [`Arnoldi::operands`] and call `iterate` again.
    ApplyOperator,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Uninitialized,
    /// Waiting for the product of the operator with basis vector `column`.
    Iterating { column: usize },
    Converged,
    Failed(ArnoldiError),
}

/// Ritz data from the latest convergence check, ordered wanted-first.
#[derive(Debug, Clone)]
struct Ritz {
    values: Vec<Complex64>,
    vectors: DMatrix<Complex64>,
    estimates: Vec<f64>,
    converged: Vec<bool>,
}

/// Eigenpairs handed back to the caller, in wanted-first order.
#[derive(Debug, Clone)]
pub struct RitzPairs {
    pub values: Vec<Complex64>,
    pub vectors: Vec<ComplexField>,
    /// Residual estimates |f| |e_m^T y| for each pair.
    pub estimates: Vec<f64>,
}

impl RitzPairs {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct Arnoldi {
    n_comp: usize,
    grid: Grid3D,
    n: usize,
    nev: usize,
    ncv: usize,
    which: Which,
    tol: f64,
    max_iterations: usize,
    timeout: Option<Duration>,
    seed: u64,
    start: Option<ComplexField>,

    state: State,
    basis: Vec<ComplexField>,
    h: DMatrix<Complex64>,
    residual: ComplexField,
    rnorm: f64,
    x: ComplexField,
    y: ComplexField,

    iterations: usize,
    products: usize,
    random_draws: u64,
    started: Option<Instant>,
    ritz: Option<Ritz>,
}

impl Arnoldi {
    /// Validate the parameters for an operator on `n_comp` components per cell of `grid`.
    pub fn new(n_comp: usize, grid: Grid3D, config: ArnoldiConfig) -> Result<Self, ArnoldiError> {
        let n = n_comp * grid.n_cells();
        if n == 0 {
            return Err(ArnoldiError::InvalidDimension(n));
        }
        let nev = config.nev;
        if nev == 0 || nev >= n {
            return Err(ArnoldiError::InvalidNev { nev, n });
        }
        let ncv = config.ncv.unwrap_or_else(|| (2 * nev + 1).max(20).min(n));
        let ncv_ok = (nev + 2 <= ncv && ncv <= n) || (ncv == n && nev + 2 > n);
        if !ncv_ok {
            return Err(ArnoldiError::InvalidNcv { ncv, nev, n });
        }
        if config.max_iterations == 0 {
            return Err(ArnoldiError::InvalidMaxIterations);
        }
        if !config.tol.is_finite() || config.tol < 0.0 {
            return Err(ArnoldiError::InvalidTolerance(config.tol));
        }
        if let Some(start) = &config.start {
            if start.n_comp() != n_comp || *start.grid() != grid {
                return Err(ArnoldiError::InvalidDimension(start.len()));
            }
        }

        Ok(Self {
            n_comp,
            grid,
            n,
            nev,
            ncv,
            which: config.which,
            tol: config.tol,
            max_iterations: config.max_iterations,
            timeout: config.timeout,
            seed: config.seed,
            start: config.start,
            state: State::Uninitialized,
            basis: Vec::with_capacity(ncv),
            h: DMatrix::zeros(ncv, ncv),
            residual: ComplexField::zeros(n_comp, grid),
            rnorm: 0.0,
            x: ComplexField::zeros(n_comp, grid),
            y: ComplexField::zeros(n_comp, grid),
            iterations: 0,
            products: 0,
            random_draws: 0,
            started: None,
            ritz: None,
        })
    }

    pub fn nev(&self) -> usize {
        self.nev
    }

    pub fn ncv(&self) -> usize {
        self.ncv
    }

    /// Completed restart cycles (each ends with a convergence check).
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Operator applications consumed so far.
    pub fn products(&self) -> usize {
        self.products
    }

    /// Wanted Ritz values that passed the last convergence check.
    pub fn converged(&self) -> usize {
        self.ritz
            .as_ref()
            .map(|r| r.converged[..self.nev].iter().filter(|&&c| c).count())
            .unwrap_or(0)
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Converged
    }

    /// The vector to multiply and the buffer that receives the product.
    pub fn operands(&mut self) -> (&ComplexField, &mut ComplexField) {
        (&self.x, &mut self.y)
    }

    /// Advance the iteration. Errors are sticky: once failed, every further
    /// call returns the same error.
    pub fn iterate(&mut self) -> Result<Ido, ArnoldiError> {
        let result = match &self.state {
            State::Uninitialized => {
                self.started = Some(Instant::now());
                self.initialise()
            }
            State::Iterating { column } => {
                let column = *column;
                self.absorb(column)
            }
            State::Converged => Ok(Ido::Done),
            State::Failed(e) => Err(e.clone()),
        };
        if let Err(e) = &result {
            self.state = State::Failed(e.clone());
        }
        result
    }

    /// The `nev` wanted Ritz pairs. Only valid after convergence.
    pub fn extract(&self) -> Result<RitzPairs, ArnoldiError> {
        match &self.state {
            State::Converged => self.ritz_pairs(false),
            State::Failed(e) => Err(e.clone()),
            _ => Err(ArnoldiError::Protocol(
                "extract called before the iteration finished".to_string(),
            )),
        }
    }

    /// The converged subset of the wanted pairs; also available after
    /// running out of iterations.
    pub fn extract_partial(&self) -> Result<RitzPairs, ArnoldiError> {
        match &self.state {
            State::Converged | State::Failed(ArnoldiError::MaxIterations { .. }) => {
                self.ritz_pairs(true)
            }
            State::Failed(e) => Err(e.clone()),
            _ => Err(ArnoldiError::Protocol(
                "extract_partial called before the iteration finished".to_string(),
            )),
        }
    }

    fn initialise(&mut self) -> Result<Ido, ArnoldiError> {
        let mut v0 = match self.start.take() {
            Some(v) => v,
            None => ComplexField::random(self.n_comp, self.grid, self.seed),
        };
        let norm = v0.norm();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(ArnoldiError::ZeroStartVector);
        }
        v0.scale_real(1.0 / norm);
        self.basis.clear();
        self.basis.push(v0);
        self.h.fill(ZERO);
        debug!(
            "[arnoldi] n = {}, nev = {}, ncv = {}, which = {}",
            self.n,
            self.nev,
            self.ncv,
            self.which.as_str()
        );
        Ok(self.request(0))
    }

    fn request(&mut self, column: usize) -> Ido {
        self.x = self.basis[column].clone();
        self.state = State::Iterating { column };
        Ido::ApplyOperator
    }

    fn check_timeout(&self) -> Result<(), ArnoldiError> {
        if let (Some(limit), Some(started)) = (self.timeout, self.started) {
            let elapsed = started.elapsed();
            if elapsed > limit {
                return Err(ArnoldiError::Timeout {
                    elapsed,
                    iterations: self.iterations,
                });
            }
        }
        Ok(())
    }

    /// Take y = A v_column and extend the factorisation by one column.
    fn absorb(&mut self, column: usize) -> Result<Ido, ArnoldiError> {
        let mut w = std::mem::replace(&mut self.y, ComplexField::zeros(self.n_comp, self.grid));
        if w.n_comp() != self.n_comp || *w.grid() != self.grid {
            return Err(ArnoldiError::Protocol(format!(
                "product buffer has {} entries, expected {}",
                w.len(),
                self.n
            )));
        }
        let y_norm = w.norm();
        if !y_norm.is_finite() {
            return Err(ArnoldiError::Protocol(
                "operator returned non-finite values".to_string(),
            ));
        }
        self.products += 1;
        self.check_timeout()?;

        let j = column;
        let (coeffs, beta, dependent) = orthogonalise(&self.basis[..=j], &mut w, y_norm)?;
        for (i, c) in coeffs.into_iter().enumerate() {
            self.h[(i, j)] = c;
        }

        if j + 1 < self.ncv {
            self.append(j, w, beta, dependent)?;
            return Ok(self.request(j + 1));
        }

        // Full length-ncv factorisation. A basis spanning the whole space
        // leaves only round-off in the residual.
        self.rnorm = if self.basis.len() == self.n || dependent {
            0.0
        } else {
            beta
        };
        self.residual = w;
        self.check_and_restart()
    }

    /// Append the next basis vector after column `j`, or a random orthogonal
    /// one (with a zero subdiagonal) when the Krylov space became invariant.
    fn append(
        &mut self,
        j: usize,
        mut w: ComplexField,
        beta: f64,
        dependent: bool,
    ) -> Result<(), ArnoldiError> {
        if dependent || beta == 0.0 {
            debug!(
                "[arnoldi] invariant subspace of dimension {}; continuing with a random vector",
                j + 1
            );
            self.h[(j + 1, j)] = ZERO;
            let v = self.random_orthogonal()?;
            self.basis.push(v);
        } else {
            self.h[(j + 1, j)] = Complex64::new(beta, 0.0);
            w.scale_real(1.0 / beta);
            self.basis.push(w);
        }
        Ok(())
    }

    fn random_orthogonal(&mut self) -> Result<ComplexField, ArnoldiError> {
        for _ in 0..RANDOM_RESTART_ATTEMPTS {
            self.random_draws += 1;
            let seed = self.seed.wrapping_add(self.random_draws.wrapping_mul(0x9E37_79B9));
            let mut v = ComplexField::random(self.n_comp, self.grid, seed);
            let v_norm = v.norm();
            let (_, norm, dependent) = orthogonalise(&self.basis, &mut v, v_norm)?;
            if !dependent && norm > 0.0 {
                v.scale_real(1.0 / norm);
                return Ok(v);
            }
        }
        Err(ArnoldiError::ZeroStartVector)
    }

    fn check_and_restart(&mut self) -> Result<Ido, ArnoldiError> {
        let m = self.ncv;
        let (theta, y) =
            schur_eigendecompose(&self.h).ok_or(ArnoldiError::RitzDecomposition)?;

        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by(|&a, &b| self.which.compare(theta[a], theta[b]));
        let values: Vec<Complex64> = order.iter().map(|&i| theta[i]).collect();
        let vectors = DMatrix::from_fn(m, m, |r, c| y[(r, order[c])]);

        let tol = if self.tol == 0.0 { f64::EPSILON } else { self.tol };
        let eps23 = f64::EPSILON.powf(2.0 / 3.0);
        let estimates: Vec<f64> = (0..m)
            .map(|c| self.rnorm * vectors[(m - 1, c)].norm())
            .collect();
        let converged: Vec<bool> = (0..m)
            .map(|c| estimates[c] <= tol * eps23.max(values[c].norm()))
            .collect();
        let nconv = converged[..self.nev].iter().filter(|&&c| c).count();

        self.iterations += 1;
        debug!(
            "[arnoldi] iteration {}: {}/{} converged, |f| = {:.3e}, products = {}",
            self.iterations, nconv, self.nev, self.rnorm, self.products
        );
        self.ritz = Some(Ritz {
            values,
            vectors,
            estimates,
            converged,
        });

        if nconv >= self.nev {
            info!(
                "[arnoldi] converged {} eigenvalue(s) in {} iteration(s), {} operator products",
                self.nev, self.iterations, self.products
            );
            self.state = State::Converged;
            return Ok(Ido::Done);
        }
        if self.iterations >= self.max_iterations {
            return Err(ArnoldiError::MaxIterations {
                iterations: self.iterations,
                converged: nconv,
            });
        }
        self.check_timeout()?;
        self.restart()
    }

    /// Apply the unwanted Ritz values as exact shifts and compress the
    /// factorisation to length nev, then resume expanding it.
    fn restart(&mut self) -> Result<Ido, ArnoldiError> {
        let m = self.ncv;
        let k = self.nev;
        let shifts: Vec<Complex64> = match &self.ritz {
            Some(r) => r.values[k..].to_vec(),
            None => return Err(ArnoldiError::Protocol("restart without Ritz values".to_string())),
        };

        let mut h = self.h.clone();
        let mut q_acc = DMatrix::<Complex64>::identity(m, m);
        for mu in shifts {
            let mut shifted = h.clone();
            for i in 0..m {
                shifted[(i, i)] -= mu;
            }
            let q = shifted.qr().q();
            h = q.adjoint() * &h * &q;
            for c in 0..m {
                for r in (c + 2)..m {
                    h[(r, c)] = ZERO;
                }
            }
            q_acc = &q_acc * &q;
        }

        // V <- V Q, keeping columns 0..=k (column k feeds the new residual).
        let mut new_basis = (0..=k)
            .map(|c| {
                let mut v = ComplexField::zeros(self.n_comp, self.grid);
                for (r, vr) in self.basis.iter().enumerate() {
                    v.axpy(q_acc[(r, c)], vr)?;
                }
                Ok(v)
            })
            .collect::<Result<Vec<ComplexField>, ArnoldiError>>()?;
        let mut f = new_basis.pop().unwrap_or_else(|| ComplexField::zeros(self.n_comp, self.grid));
        f.scale(h[(k, k - 1)]);
        f.axpy(q_acc[(m - 1, k - 1)], &self.residual)?;

        self.h.fill(ZERO);
        for c in 0..k {
            for r in 0..k {
                self.h[(r, c)] = h[(r, c)];
            }
        }
        self.basis = new_basis;

        // Keep the compressed residual orthogonal to the kept basis; the
        // correction belongs to the last column of H.
        let f_norm = f.norm();
        let (coeffs, beta, dependent) = orthogonalise(&self.basis, &mut f, f_norm)?;
        for (i, c) in coeffs.into_iter().enumerate() {
            self.h[(i, k - 1)] += c;
        }
        self.append(k - 1, f, beta, dependent)?;
        Ok(self.request(k))
    }

    fn ritz_pairs(&self, converged_only: bool) -> Result<RitzPairs, ArnoldiError> {
        let ritz = self.ritz.as_ref().ok_or(ArnoldiError::NoConvergedValues)?;
        let mut pairs = RitzPairs {
            values: Vec::new(),
            vectors: Vec::new(),
            estimates: Vec::new(),
        };
        for c in 0..self.nev {
            if converged_only && !ritz.converged[c] {
                continue;
            }
            let mut v = ComplexField::zeros(self.n_comp, self.grid);
            for (r, vr) in self.basis.iter().enumerate() {
                v.axpy(ritz.vectors[(r, c)], vr)?;
            }
            let norm = v.norm();
            if norm > 0.0 {
                v.scale_real(1.0 / norm);
            }
            pairs.values.push(ritz.values[c]);
            pairs.vectors.push(v);
            pairs.estimates.push(ritz.estimates[c]);
        }
        if pairs.is_empty() {
            return Err(ArnoldiError::NoConvergedValues);
        }
        Ok(pairs)
    }
}

/// Classical Gram-Schmidt of `w` against the orthonormal `basis`, with one
/// DGKS correction. Returns the coefficients, the remaining norm, and
/// whether `w` was numerically inside span(basis).
fn orthogonalise(
    basis: &[ComplexField],
    w: &mut ComplexField,
    w_norm: f64,
) -> Result<(Vec<Complex64>, f64, bool), ArnoldiError> {
    let mut coeffs = project_out(basis, w)?;
    let mut beta = w.norm();
    if w_norm == 0.0 {
        return Ok((coeffs, beta, true));
    }
    if beta < DGKS_ETA * w_norm {
        let correction = project_out(basis, w)?;
        for (c, d) in coeffs.iter_mut().zip(correction) {
            *c += d;
        }
        let before = beta;
        beta = w.norm();
        if beta < DGKS_ETA * before {
            return Ok((coeffs, beta, true));
        }
    }
    Ok((coeffs, beta, false))
}

/// One classical Gram-Schmidt sweep: all coefficients first, then the updates.
fn project_out(
    basis: &[ComplexField],
    w: &mut ComplexField,
) -> Result<Vec<Complex64>, ArnoldiError> {
    let coeffs = basis
        .iter()
        .map(|v| ComplexField::dotc(v, w))
        .collect::<Result<Vec<_>, Error>>()?;
    for (v, &c) in basis.iter().zip(&coeffs) {
        w.axpy(-c, v)?;
    }
    Ok(coeffs)
}
