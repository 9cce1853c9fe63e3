// src/dispersion.rs
//
// Quick dispersion estimate: project the lab-frame dynamical matrix onto a
// single plane wave and solve the resulting 3x3 eigenproblem.
//
// For a uniform ground state with periodic-like bulk behaviour this gives
// the spin-wave frequency at wavevector k; for finite samples it is an
// estimate of the mode that best resembles the plane wave.
//
// Plane-wave indices run over -n/2..n/2-1 (even n) or -(n-1)/2..(n-1)/2
// (odd n) per axis. The sampling helpers below produce index lists for
// `dispersion`: the full set, a box in k-space, or the lattice points
// closest to a line through k = 0.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::eigen::dense::eig;
use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::tensor::Tensor;
use crate::vec3::{dot, norm, normalize};

/// Unit-norm plane wave exp(2πi Σ_a index_a i_a / n_a) over the grid.
pub fn fourier_mode(index: [i32; 3], grid: &Grid3D) -> Vec<Complex64> {
    let size = grid.size();
    let n = grid.n_cells();
    let amp = 1.0 / (n as f64).sqrt();
    let phase_step: Vec<f64> = (0..3)
        .map(|a| 2.0 * std::f64::consts::PI * index[a] as f64 / size[a] as f64)
        .collect();
    (0..n)
        .map(|r| {
            let (i, j, k) = grid.ijk(r);
            let phase = phase_step[0] * i as f64 + phase_step[1] * j as f64 + phase_step[2] * k as f64;
            Complex64::from_polar(amp, phase)
        })
        .collect()
}

/// Wavevector (rad/m) of the plane wave with the given index.
pub fn wavevector(index: [i32; 3], grid: &Grid3D) -> [f64; 3] {
    let size = grid.size();
    let cell = grid.cell_size();
    let mut k = [0.0; 3];
    for a in 0..3 {
        k[a] = 2.0 * std::f64::consts::PI * index[a] as f64 / (size[a] as f64 * cell[a]);
    }
    k
}

#[derive(Debug, Clone)]
pub struct PlaneWaveModes {
    pub index: [i32; 3],
    pub wavevector: [f64; 3],
    pub eigenvalues: [Complex64; 3],
    /// Column c is the polarisation of eigenvalue c.
    pub polarisations: [[Complex64; 3]; 3],
}

impl PlaneWaveModes {
    /// Angular frequencies Im(lambda).
    pub fn frequencies(&self) -> [f64; 3] {
        [
            self.eigenvalues[0].im,
            self.eigenvalues[1].im,
            self.eigenvalues[2].im,
        ]
    }
}

/// P[c][c'] = Σ_{r,r'} conj(φ_r) D[c][c'][r][r'] φ_r', then eig(P).
pub fn plane_wave_modes(d: &Tensor, index: [i32; 3]) -> Result<PlaneWaveModes> {
    if d.n_comp != 3 {
        return Err(Error::shape("dynamical matrix", "3 components", d.n_comp));
    }
    let grid = d.grid;
    let n = grid.n_cells();
    let phi = fourier_mode(index, &grid);

    let mut p = DMatrix::<Complex64>::zeros(3, 3);
    for c in 0..3 {
        for r in 0..n {
            let row = d.row(c * n + r);
            let left = phi[r].conj();
            for c2 in 0..3 {
                let mut acc = Complex64::new(0.0, 0.0);
                for (r2, v) in row[c2 * n..(c2 + 1) * n].iter().enumerate() {
                    acc += phi[r2] * *v;
                }
                p[(c, c2)] += left * acc;
            }
        }
    }

    let (values, vectors) = eig(&p)?;
    let mut eigenvalues = [Complex64::new(0.0, 0.0); 3];
    let mut polarisations = [[Complex64::new(0.0, 0.0); 3]; 3];
    for c in 0..3 {
        eigenvalues[c] = values[c];
        for row in 0..3 {
            polarisations[row][c] = vectors[(row, c)];
        }
    }
    Ok(PlaneWaveModes {
        index,
        wavevector: wavevector(index, &grid),
        eigenvalues,
        polarisations,
    })
}

/// Plane-wave estimates for a list of indices.
pub fn dispersion(d: &Tensor, indices: &[[i32; 3]]) -> Result<Vec<PlaneWaveModes>> {
    indices.iter().map(|&idx| plane_wave_modes(d, idx)).collect()
}

/// Plane-wave estimates along `direction`, paired with the signed |k| of
/// each sample (see [`k_along`]) and sorted by it.
pub fn dispersion_along(d: &Tensor, direction: [f64; 3]) -> Result<Vec<(f64, PlaneWaveModes)>> {
    let grid = d.grid;
    let mut out = along_direction(&grid, direction)?
        .into_iter()
        .map(|idx| Ok((k_along(idx, &grid, direction)?, plane_wave_modes(d, idx)?)))
        .collect::<Result<Vec<_>>>()?;
    out.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(out)
}

/// Lowest and highest index along an axis with `n` cells.
fn index_range(n: usize) -> (i32, i32) {
    let n = n as i32;
    let lo = -(n / 2);
    (lo, lo + n - 1)
}

/// Cartesian product of per-axis index lists, x slowest and z fastest.
fn expand(axes: &[Vec<i32>; 3]) -> Vec<[i32; 3]> {
    let mut out = Vec::with_capacity(axes[0].len() * axes[1].len() * axes[2].len());
    for &i in &axes[0] {
        for &j in &axes[1] {
            for &k in &axes[2] {
                out.push([i, j, k]);
            }
        }
    }
    out
}

/// Every plane wave the grid resolves.
pub fn all_modes(grid: &Grid3D) -> Vec<[i32; 3]> {
    let size = grid.size();
    let axes = [0, 1, 2].map(|a| {
        let (lo, hi) = index_range(size[a]);
        (lo..=hi).collect::<Vec<_>>()
    });
    expand(&axes)
}

/// Indices inside the k-space box [k_start, k_stop] (rad/m), with at most
/// `n_points[a]` evenly spaced samples per axis. The highest index in range
/// is always kept; a single sample sits in the middle of the range. An axis
/// with no index in range gives an empty list.
pub fn mode_sample(
    grid: &Grid3D,
    k_start: [f64; 3],
    k_stop: [f64; 3],
    n_points: [usize; 3],
) -> Vec<[i32; 3]> {
    let size = grid.size();
    let cell = grid.cell_size();
    let mut axes: [Vec<i32>; 3] = Default::default();
    for a in 0..3 {
        let length = size[a] as f64 * cell[a];
        let to_index = |k: f64| (length * k / (2.0 * std::f64::consts::PI)).floor() as i32;
        let (lo, hi) = index_range(size[a]);
        let start = to_index(k_start[a]).max(lo);
        let stop = to_index(k_stop[a]).min(hi);
        if stop < start || n_points[a] == 0 {
            return Vec::new();
        }

        let available = (stop - start + 1) as usize;
        axes[a] = if n_points[a] >= available {
            (start..=stop).collect()
        } else if n_points[a] == 1 {
            vec![start + (available / 2) as i32]
        } else {
            let step = (available - 1) as f64 / (n_points[a] - 1) as f64;
            let mut v: Vec<i32> = (0..n_points[a] - 1)
                .map(|i| start + (i as f64 * step).floor() as i32)
                .collect();
            v.push(stop);
            v
        };
    }
    expand(&axes)
}

/// Walk the index lattice along `direction` from k = 0, recording each
/// nearest lattice point once, until one axis has crossed `limit[a]` planes.
fn walk_direction(grid: &Grid3D, direction: [f64; 3], limit: [usize; 3]) -> Result<Vec<[i32; 3]>> {
    if !(norm(direction).is_finite() && norm(direction) > 0.0) {
        return Err(Error::Config(format!("invalid sampling direction {direction:?}")));
    }
    let dir = normalize(direction);
    let size = grid.size();
    let cell = grid.cell_size();
    // Plane crossings per unit path length along each axis.
    let scale: [f64; 3] = [0, 1, 2].map(|a| size[a] as f64 * cell[a] * dir[a].abs());
    let sign: [f64; 3] = dir.map(|c| if c < 0.0 { -1.0 } else { 1.0 });

    let mut points = vec![[0; 3]];
    let mut crossed = [0usize; 3];
    let next = |a: usize, crossed: &[usize; 3]| (crossed[a] + 1) as f64 / scale[a];
    while (0..3).all(|a| crossed[a] < limit[a]) {
        let a = (0..3)
            .min_by(|&x, &y| next(x, &crossed).total_cmp(&next(y, &crossed)))
            .unwrap_or(0);
        let t = next(a, &crossed);
        let point = [0, 1, 2].map(|c| (sign[c] * (t * scale[c]).round()) as i32);
        if points.last() != Some(&point) {
            points.push(point);
        }
        crossed[a] += 1;
    }
    Ok(points)
}

/// Lattice points closest to the line through k = 0 along `direction`, in
/// both senses: 0, k1, k2, ..., kn, -kn, ..., -k1. Points outside the
/// resolvable range are dropped.
pub fn along_direction(grid: &Grid3D, direction: [f64; 3]) -> Result<Vec<[i32; 3]>> {
    let size = grid.size();
    let ranges = size.map(index_range);
    let inside = |p: &[i32; 3]| (0..3).all(|a| p[a] >= ranges[a].0 && p[a] <= ranges[a].1);
    let half = walk_direction(grid, direction, size.map(|n| (n + 1) / 2))?
        .into_iter()
        .filter(|p| inside(p) && inside(&p.map(|c| -c)))
        .collect::<Vec<_>>();

    let mut out = half.clone();
    out.extend(half.iter().skip(1).rev().map(|p| p.map(|c| -c)));
    Ok(out)
}

/// Lattice points along `direction` in one sense only, running up to the
/// full grid size (indices n/2 and above alias the negative ones).
pub fn along_direction_unfolded(grid: &Grid3D, direction: [f64; 3]) -> Result<Vec<[i32; 3]>> {
    let size = grid.size();
    Ok(walk_direction(grid, direction, size)?
        .into_iter()
        .filter(|p| (0..3).all(|a| p[a].unsigned_abs() < size[a] as u32))
        .collect())
}

/// Component of the wavevector of `index` along `direction` (rad/m).
pub fn k_along(index: [i32; 3], grid: &Grid3D, direction: [f64; 3]) -> Result<f64> {
    if !(norm(direction).is_finite() && norm(direction) > 0.0) {
        return Err(Error::Config(format!("invalid sampling direction {direction:?}")));
    }
    Ok(dot(wavevector(index, grid), normalize(direction)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effective_field::{CpuEngine, FieldEngine};
    use crate::gyro::dynamic_operate;
    use crate::linearize::linear_hamiltonian;
    use crate::params::System;
    use crate::vector_field::VectorField;

    #[test]
    fn fourier_modes_are_orthonormal() {
        let grid = Grid3D::new(4, 3, 1, 1e-9, 1e-9, 1e-9);
        let a = fourier_mode([1, 0, 0], &grid);
        let b = fourier_mode([1, 2, 0], &grid);
        let dot = |x: &[Complex64], y: &[Complex64]| -> Complex64 {
            x.iter().zip(y).map(|(p, q)| p.conj() * q).sum()
        };
        assert!((dot(&a[..], &a[..]) - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        assert!(dot(&a[..], &b[..]).norm() < 1e-12);
        let k = wavevector([1, 2, 0], &grid);
        assert!((k[1] - 2.0 * std::f64::consts::PI * 2.0 / 3e-9).abs() < 1e-3);
    }

    #[test]
    fn all_modes_cover_the_resolvable_range() {
        let grid = Grid3D::new(4, 3, 1, 1e-9, 1e-9, 1e-9);
        let modes = all_modes(&grid);
        assert_eq!(modes.len(), grid.n_cells());
        assert_eq!(modes[0], [-2, -1, 0]);
        assert_eq!(modes[1], [-2, 0, 0]);
        assert_eq!(*modes.last().unwrap(), [1, 1, 0]);
        // Distinct plane waves are orthogonal, so the set is a basis.
        let a = fourier_mode(modes[3], &grid);
        let b = fourier_mode(modes[7], &grid);
        let dot: Complex64 = a.iter().zip(&b).map(|(p, q)| p.conj() * q).sum();
        assert!(dot.norm() < 1e-12);
    }

    #[test]
    fn mode_sample_spaces_points_inside_the_box() {
        let grid = Grid3D::new(10, 1, 1, 1e-9, 1e-9, 1e-9);
        let two_pi_over_l = 2.0 * std::f64::consts::PI / 1e-8;
        let stop = [3.5 * two_pi_over_l, 0.0, 0.0];

        let picked = mode_sample(&grid, [0.0; 3], stop, [3, 1, 1]);
        assert_eq!(picked, vec![[0, 0, 0], [1, 0, 0], [3, 0, 0]]);

        let every = mode_sample(&grid, [0.0; 3], stop, [10, 1, 1]);
        assert_eq!(every.len(), 4);

        let middle = mode_sample(&grid, [0.0; 3], stop, [1, 1, 1]);
        assert_eq!(middle, vec![[2, 0, 0]]);

        // Requests past the Nyquist index are clamped.
        let far = 100.0 * two_pi_over_l;
        let wide = mode_sample(&grid, [-far, 0.0, 0.0], [far, 0.0, 0.0], [20, 1, 1]);
        assert_eq!(wide.first(), Some(&[-5, 0, 0]));
        assert_eq!(wide.last(), Some(&[4, 0, 0]));

        assert!(mode_sample(&grid, stop, [0.0; 3], [3, 1, 1]).is_empty());
    }

    #[test]
    fn sampling_along_an_axis_and_a_diagonal() {
        let grid = Grid3D::new(8, 8, 1, 1.0, 1.0, 1.0);
        let x = along_direction(&grid, [1.0, 0.0, 0.0]).unwrap();
        let xs: Vec<i32> = x.iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![0, 1, 2, 3, -3, -2, -1]);
        assert!(x.iter().all(|p| p[1] == 0 && p[2] == 0));

        let back = along_direction(&grid, [-1.0, 0.0, 0.0]).unwrap();
        assert_eq!(back[1], [-1, 0, 0]);

        let square = Grid3D::new(4, 4, 1, 1.0, 1.0, 1.0);
        let diag = along_direction(&square, [1.0, 1.0, 0.0]).unwrap();
        assert_eq!(diag, vec![[0, 0, 0], [1, 1, 0], [-1, -1, 0]]);

        let line = Grid3D::new(4, 1, 1, 1.0, 1.0, 1.0);
        let unfolded = along_direction_unfolded(&line, [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(unfolded, vec![[0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0]]);

        let k = k_along([2, 0, 0], &grid, [2.0, 0.0, 0.0]).unwrap();
        assert!((k - 2.0 * std::f64::consts::PI * 2.0 / 8.0).abs() < 1e-12);
        assert!(matches!(along_direction(&grid, [0.0; 3]), Err(Error::Config(_))));
    }

    #[test]
    fn dispersion_along_a_chain_is_symmetric_in_k() {
        let grid = Grid3D::new(6, 1, 1, 5e-9, 5e-9, 5e-9);
        let sys = System::uniform(grid, 8e5, 1.3e-11, 5e4, [0.0, 0.0, 1.0], [0.0, 0.0, 0.5])
            .unwrap();
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::new(grid);
        let h = linear_hamiltonian(&engine, &m).unwrap();
        let d = dynamic_operate(&h, &m, engine.system()).unwrap();

        let samples = dispersion_along(&d, [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(samples.len(), 5);
        assert!(samples.windows(2).all(|w| w[0].0 <= w[1].0));
        let top = |s: &PlaneWaveModes| s.frequencies().iter().cloned().fold(f64::MIN, f64::max);
        // +k and -k see the same exchange stiffness.
        let (first, last) = (&samples[0].1, &samples[4].1);
        assert!((top(first) - top(last)).abs() < 1e-6 * top(first));
        // Exchange stiffens the shortest wavelengths.
        assert!(top(first) > top(&samples[2].1));
    }

    #[test]
    fn uniform_wave_of_a_macrospin_is_kittel() {
        let grid = Grid3D::new(1, 1, 1, 5e-9, 5e-9, 5e-9);
        let (ms, ku, b) = (8e5, 5e4, 0.1);
        let sys = System::uniform(grid, ms, 0.0, ku, [0.0, 0.0, 1.0], [0.0, 0.0, b]).unwrap();
        let expected = sys.gamma * (b + 2.0 * ku / ms);
        let engine = CpuEngine::new(sys).unwrap();
        let m = VectorField::new(grid);
        let h = linear_hamiltonian(&engine, &m).unwrap();
        let d = dynamic_operate(&h, &m, engine.system()).unwrap();

        let modes = plane_wave_modes(&d, [0, 0, 0]).unwrap();
        let mut w = modes.frequencies();
        w.sort_by(f64::total_cmp);
        assert!((w[0] + expected).abs() < 1e-6 * expected);
        assert!(w[1].abs() < 1e-6 * expected);
        assert!((w[2] - expected).abs() < 1e-6 * expected);
    }
}
