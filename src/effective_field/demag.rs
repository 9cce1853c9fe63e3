// src/effective_field/demag.rs
//
// Magnetostatic (demagnetising) kernel and its FFT-accelerated convolution.
//
// We compute (discrete convolution):
//   B_demag_i(r) = sum_r' K_ij(r - r') M_j(r')
// where M = Ms * m is magnetisation in A/m and B_demag is in Tesla.
//
// - Real-space kernel K_ij over every displacement in [-(N-1), +(N-1)] per axis,
//   computed MuMax-style (face-charge integration, averaged over the destination
//   cell). Only one octant is integrated; the rest follows from mirror symmetry,
//   so the kernel is exactly even in the displacement.
// - Convolution is zero-padded to 2N along every axis with more than one cell
//   (open boundaries).
// - For a cubic cell the self term is exactly -mu0/3 on the diagonal.
// - For Nz = 1 the xz / yz components vanish by symmetry and are stored as 0.

use std::collections::hash_map::DefaultHasher;
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use log::debug;
use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::params::MU0;
use crate::vec3::Mat3;
use crate::vector_field::VectorField;

/// Kernel integration accuracy (MuMax default).
pub const DEMAG_ACCURACY: f64 = 6.0;

/// Component pairs stored by the kernel, in order.
const PAIRS: [(usize, usize); 6] = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];

#[inline]
fn pair_slot(c: usize, c2: usize) -> usize {
    match (c.min(c2), c.max(c2)) {
        (0, 0) => 0,
        (0, 1) => 1,
        (0, 2) => 2,
        (1, 1) => 3,
        (1, 2) => 4,
        _ => 5,
    }
}

#[inline]
fn wrap_index(d: isize, n: usize) -> usize {
    let n = n as isize;
    let mut v = d % n;
    if v < 0 {
        v += n;
    }
    v as usize
}

/// Real-space demag kernel in Tesla per (A/m), keyed by grid geometry.
#[derive(Debug, Clone)]
pub struct DemagKernel {
    pub grid: Grid3D,
    pub accuracy: f64,
    /// Extent per axis: 2N - 1 displacements.
    ext: [usize; 3],
    comps: [Vec<f64>; 6],
}

impl DemagKernel {
    pub fn new(grid: Grid3D) -> Result<Self> {
        Self::with_accuracy(grid, DEMAG_ACCURACY)
    }

    pub fn with_accuracy(grid: Grid3D, accuracy: f64) -> Result<Self> {
        grid.validate()?;
        if !(accuracy.is_finite() && accuracy > 0.0) {
            return Err(Error::Config(format!("demag accuracy {accuracy} must be positive")));
        }
        let n = grid.size();
        let ext = [2 * n[0] - 1, 2 * n[1] - 1, 2 * n[2] - 1];
        let len = ext[0] * ext[1] * ext[2];

        debug!("[demag] integrating kernel for {} (accuracy {})", grid, accuracy);

        // One octant: non-negative displacements only.
        let octant: Vec<[usize; 3]> = (0..n[2])
            .flat_map(|k| (0..n[1]).flat_map(move |j| (0..n[0]).map(move |i| [i, j, k])))
            .collect();
        let cell = grid.cell_size();
        let values: Vec<Mat3> = octant
            .par_iter()
            .map(|s| prism_kernel(cell, [s[0] as isize, s[1] as isize, s[2] as isize], accuracy))
            .collect();

        let mut comps: [Vec<f64>; 6] = std::array::from_fn(|_| vec![0.0; len]);
        let flat = |s: [isize; 3]| -> usize {
            let ix = (s[0] + n[0] as isize - 1) as usize;
            let iy = (s[1] + n[1] as isize - 1) as usize;
            let iz = (s[2] + n[2] as isize - 1) as usize;
            (iz * ext[1] + iy) * ext[0] + ix
        };

        for (s, k) in octant.iter().zip(&values) {
            for mx in [1isize, -1] {
                for my in [1isize, -1] {
                    for mz in [1isize, -1] {
                        let sign = [mx, my, mz];
                        let d = [
                            mx * s[0] as isize,
                            my * s[1] as isize,
                            mz * s[2] as isize,
                        ];
                        let idx = flat(d);
                        for (slot, &(a, b)) in PAIRS.iter().enumerate() {
                            // Off-diagonal K_ab is odd in both d_a and d_b.
                            let f = if a == b {
                                1.0
                            } else if d[a] == 0 || d[b] == 0 {
                                0.0
                            } else {
                                (sign[a] * sign[b]) as f64
                            };
                            comps[slot][idx] = f * k[a][b];
                        }
                    }
                }
            }
        }

        if n[2] == 1 {
            comps[pair_slot(0, 2)].fill(0.0);
            comps[pair_slot(1, 2)].fill(0.0);
        }

        Ok(Self {
            grid,
            accuracy,
            ext,
            comps,
        })
    }

    /// K_cc' at integer displacement s (destination minus source).
    #[inline]
    pub fn get(&self, c: usize, c2: usize, s: [isize; 3]) -> f64 {
        let n = self.grid.size();
        debug_assert!((0..3).all(|a| s[a].unsigned_abs() < n[a]));
        let ix = (s[0] + n[0] as isize - 1) as usize;
        let iy = (s[1] + n[1] as isize - 1) as usize;
        let iz = (s[2] + n[2] as isize - 1) as usize;
        self.comps[pair_slot(c, c2)][(iz * self.ext[1] + iy) * self.ext[0] + ix]
    }

    /// Hash of the geometry, accuracy and every stored kernel entry.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.grid.size().hash(&mut h);
        for d in self.grid.cell_size() {
            d.to_bits().hash(&mut h);
        }
        self.accuracy.to_bits().hash(&mut h);
        for comp in &self.comps {
            for v in comp {
                v.to_bits().hash(&mut h);
            }
        }
        h.finish()
    }

    /// K_cc' between destination cell r and source cell r2.
    #[inline]
    pub fn between(&self, c: usize, c2: usize, r: usize, r2: usize) -> f64 {
        let (i, j, k) = self.grid.ijk(r);
        let (i2, j2, k2) = self.grid.ijk(r2);
        self.get(
            c,
            c2,
            [
                i as isize - i2 as isize,
                j as isize - j2 as isize,
                k as isize - k2 as isize,
            ],
        )
    }
}

/// Zero-padded FFT convolution with a precomputed kernel.
pub struct DemagConvolution {
    grid: Grid3D,
    pad: [usize; 3],
    /// Kernel in Fourier domain, slots as `PAIRS`.
    k_hat: [Vec<Complex64>; 6],
    fwd: [Arc<dyn Fft<f64>>; 3],
    inv: [Arc<dyn Fft<f64>>; 3],
}

impl DemagConvolution {
    pub fn new(kernel: &DemagKernel) -> Self {
        let grid = kernel.grid;
        let n = grid.size();
        let pad = n.map(|na| if na > 1 { 2 * na } else { 1 });
        let n_pad = pad[0] * pad[1] * pad[2];

        let mut planner = FftPlanner::<f64>::new();
        let fwd = pad.map(|p| planner.plan_fft_forward(p));
        let inv = pad.map(|p| planner.plan_fft_inverse(p));

        let zero = Complex64::new(0.0, 0.0);
        let mut k_hat: [Vec<Complex64>; 6] = std::array::from_fn(|_| vec![zero; n_pad]);
        for (slot, &(a, b)) in PAIRS.iter().enumerate() {
            let buf = &mut k_hat[slot];
            for sz in -(n[2] as isize - 1)..=(n[2] as isize - 1) {
                let iz = wrap_index(sz, pad[2]);
                for sy in -(n[1] as isize - 1)..=(n[1] as isize - 1) {
                    let iy = wrap_index(sy, pad[1]);
                    for sx in -(n[0] as isize - 1)..=(n[0] as isize - 1) {
                        let ix = wrap_index(sx, pad[0]);
                        buf[(iz * pad[1] + iy) * pad[0] + ix].re = kernel.get(a, b, [sx, sy, sz]);
                    }
                }
            }
            fft3_in_place(buf, pad, &fwd);
        }

        Self {
            grid,
            pad,
            k_hat,
            fwd,
            inv,
        }
    }

    /// dst += K * (Ms m). Leaves `m` untouched.
    pub fn add_field(&self, m: &VectorField, ms: &[f64], dst: &mut VectorField) -> Result<()> {
        m.ensure_grid(&self.grid, "demag input")?;
        dst.ensure_grid(&self.grid, "demag output")?;
        if ms.len() != self.grid.n_cells() {
            return Err(Error::shape("Ms map", self.grid.n_cells(), ms.len()));
        }

        let n = self.grid.size();
        let pad = self.pad;
        let n_pad = pad[0] * pad[1] * pad[2];
        let zero = Complex64::new(0.0, 0.0);
        let padded = |i: usize, j: usize, k: usize| (k * pad[1] + j) * pad[0] + i;

        // Pack M = Ms*m into the corner of the padded arrays.
        let mut mag: [Vec<Complex64>; 3] = std::array::from_fn(|_| vec![zero; n_pad]);
        for k in 0..n[2] {
            for j in 0..n[1] {
                for i in 0..n[0] {
                    let r = self.grid.idx(i, j, k);
                    let p = padded(i, j, k);
                    for c in 0..3 {
                        mag[c][p].re = ms[r] * m.data[r][c];
                    }
                }
            }
        }
        mag.par_iter_mut()
            .for_each(|buf| fft3_in_place(buf, pad, &self.fwd));

        // B = K M in k-space
        let mut b: [Vec<Complex64>; 3] = std::array::from_fn(|_| vec![zero; n_pad]);
        for idx in 0..n_pad {
            let mv = [mag[0][idx], mag[1][idx], mag[2][idx]];
            for (a, out) in b.iter_mut().enumerate() {
                out[idx] = (0..3)
                    .map(|c| self.k_hat[pair_slot(a, c)][idx] * mv[c])
                    .sum();
            }
        }
        b.par_iter_mut().for_each(|buf| {
            fft3_in_place(buf, pad, &self.inv);
            let scale = 1.0 / n_pad as f64;
            buf.iter_mut().for_each(|v| *v *= scale);
        });

        for k in 0..n[2] {
            for j in 0..n[1] {
                for i in 0..n[0] {
                    let r = self.grid.idx(i, j, k);
                    let p = padded(i, j, k);
                    for c in 0..3 {
                        dst.data[r][c] += b[c][p].re;
                    }
                }
            }
        }
        Ok(())
    }
}

/// 3D FFT (in-place) as 1D transforms over x rows, then y and z lines.
/// rustfft is unnormalised; callers scale the inverse.
fn fft3_in_place(data: &mut [Complex64], pad: [usize; 3], plans: &[Arc<dyn Fft<f64>>; 3]) {
    let [px, py, pz] = pad;

    if px > 1 {
        for row in data.chunks_mut(px) {
            plans[0].process(row);
        }
    }

    let mut line = Vec::new();
    if py > 1 {
        line.resize(py, Complex64::new(0.0, 0.0));
        for z in 0..pz {
            for x in 0..px {
                for y in 0..py {
                    line[y] = data[(z * py + y) * px + x];
                }
                plans[1].process(&mut line);
                for y in 0..py {
                    data[(z * py + y) * px + x] = line[y];
                }
            }
        }
    }

    if pz > 1 {
        line.clear();
        line.resize(pz, Complex64::new(0.0, 0.0));
        for y in 0..py {
            for x in 0..px {
                for z in 0..pz {
                    line[z] = data[(z * py + y) * px + x];
                }
                plans[2].process(&mut line);
                for z in 0..pz {
                    data[(z * py + y) * px + x] = line[z];
                }
            }
        }
    }
}

/// Full 3×3 kernel block at displacement `s` (in cells), Tesla per (A/m).
fn prism_kernel(cell: [f64; 3], s: [isize; 3], accuracy: f64) -> Mat3 {
    let [dx, dy, dz] = cell;

    if s == [0, 0, 0] && (dx - dy).abs() < 1e-15 * dx && (dy - dz).abs() < 1e-15 * dx {
        let k = -MU0 / 3.0;
        return [[k, 0.0, 0.0], [0.0, k, 0.0], [0.0, 0.0, k]];
    }

    let r_center = [s[0] as f64 * dx, s[1] as f64 * dy, s[2] as f64 * dz];
    let mut k = [[0.0_f64; 3]; 3];
    for source_axis in 0..3 {
        let h = face_charge_field(source_axis, r_center, cell, s, accuracy);
        for dest_axis in 0..3 {
            k[dest_axis][source_axis] = MU0 * h[dest_axis];
        }
    }

    // Reciprocity: K_ab = K_ba.
    for a in 0..3 {
        for b in a + 1..3 {
            let avg = 0.5 * (k[a][b] + k[b][a]);
            k[a][b] = avg;
            k[b][a] = avg;
        }
    }
    k
}

/// Average H (per unit M along `source_axis`) over the destination cell at
/// `r_center`, from the surface charges on the two source faces normal to that axis.
fn face_charge_field(
    source_axis: usize,
    r_center: [f64; 3],
    cell: [f64; 3],
    disp: [isize; 3],
    accuracy: f64,
) -> [f64; 3] {
    let u = source_axis;
    let v = (u + 1) % 3;
    let w = (u + 2) % 3;

    let lmin = cell[0].min(cell[1]).min(cell[2]);

    // Closest distance between the two cells (zero when they touch).
    let gap = |a: usize| delta_cell(disp[a]) * cell[a];
    let mut d = (gap(0).powi(2) + gap(1).powi(2) + gap(2).powi(2)).sqrt();
    if d == 0.0 {
        d = lmin;
    }
    let max_size = d / accuracy;

    let count = |len: f64| (len / max_size).ceil().max(1.0) as usize;
    let n_dst = [count(cell[0]), count(cell[1]), count(cell[2])];
    let nv = 2 * count(cell[v]);
    let nw = 2 * count(cell[w]);

    let scale = 1.0 / ((nv * nw * n_dst[0] * n_dst[1] * n_dst[2]) as f64);
    let charge = cell[v] * cell[w] * scale;

    let sample = |a: usize, i: usize, n: usize| -> f64 {
        -0.5 * cell[a] + cell[a] / (2.0 * n as f64) + (i as f64) * (cell[a] / n as f64)
    };

    let mut h = [0.0_f64; 3];
    let mut pole = [0.0_f64; 3];
    for iv in 0..nv {
        pole[v] = sample(v, iv, nv);
        for iw in 0..nw {
            pole[w] = sample(w, iw, nw);

            for ax in 0..n_dst[0] {
                let rx = r_center[0] + sample(0, ax, n_dst[0]);
                for ay in 0..n_dst[1] {
                    let ry = r_center[1] + sample(1, ay, n_dst[1]);
                    for az in 0..n_dst[2] {
                        let rz = r_center[2] + sample(2, az, n_dst[2]);

                        // + face
                        pole[u] = 0.5 * cell[u];
                        let r1 = [rx - pole[0], ry - pole[1], rz - pole[2]];
                        let n1 = (r1[0] * r1[0] + r1[1] * r1[1] + r1[2] * r1[2]).sqrt();
                        let q1 = charge / (4.0 * PI * n1 * n1 * n1);

                        // - face
                        pole[u] = -0.5 * cell[u];
                        let r2 = [rx - pole[0], ry - pole[1], rz - pole[2]];
                        let n2 = (r2[0] * r2[0] + r2[1] * r2[1] + r2[2] * r2[2]).sqrt();
                        let q2 = -charge / (4.0 * PI * n2 * n2 * n2);

                        for c in 0..3 {
                            h[c] += r1[c] * q1 + r2[c] * q2;
                        }
                    }
                }
            }
        }
    }
    h
}

/// MuMax's "delta": gap in cells between two cells at integer centre distance d.
/// |d|=0 => 0; |d|=1 => 0; |d|=2 => 1; etc.
#[inline]
fn delta_cell(d: isize) -> f64 {
    let a = d.unsigned_abs() as f64;
    if a > 0.0 {
        a - 1.0
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_cube_uses_exact_self_term() {
        let grid = Grid3D::new(1, 1, 1, 1.0, 1.0, 1.0);
        let kernel = DemagKernel::new(grid).unwrap();
        let conv = DemagConvolution::new(&kernel);

        let m = VectorField::uniform(grid, [0.0, 0.0, 1.0]);
        let mut b = VectorField::zeros(grid);
        conv.add_field(&m, &[1.0], &mut b).unwrap();

        let b = b.data[0];
        assert!(b[0].abs() < 1e-12, "Bx={}", b[0]);
        assert!(b[1].abs() < 1e-12, "By={}", b[1]);
        let expected = -MU0 / 3.0;
        assert!(
            (b[2] - expected).abs() < 1e-10,
            "b_z={}, expected={}",
            b[2],
            expected
        );
    }

    #[test]
    fn kernel_is_even_and_thin_film_cross_terms_vanish() {
        let grid = Grid3D::new(3, 2, 1, 2e-9, 2e-9, 1e-9);
        let kernel = DemagKernel::new(grid).unwrap();
        for sx in -2isize..=2 {
            for sy in -1isize..=1 {
                for a in 0..3 {
                    for b in 0..3 {
                        let k1 = kernel.get(a, b, [sx, sy, 0]);
                        let k2 = kernel.get(b, a, [-sx, -sy, 0]);
                        assert_eq!(k1, k2);
                    }
                }
                assert_eq!(kernel.get(0, 2, [sx, sy, 0]), 0.0);
                assert_eq!(kernel.get(2, 1, [sx, sy, 0]), 0.0);
            }
        }
        // Nearest neighbours along x attract along x (positive Kxx), repel along z.
        assert!(kernel.get(0, 0, [1, 0, 0]) > 0.0);
        assert!(kernel.get(2, 2, [1, 0, 0]) < 0.0);
    }

    #[test]
    fn fft_convolution_matches_direct_sum() {
        let grid = Grid3D::new(3, 2, 2, 3e-9, 3e-9, 3e-9);
        let kernel = DemagKernel::new(grid).unwrap();
        let conv = DemagConvolution::new(&kernel);

        let mut m = VectorField::uniform(grid, [0.3, -0.5, 0.8]);
        m.perturb(0.5, 11);
        let ms: Vec<f64> = (0..grid.n_cells()).map(|r| 8e5 + 1e4 * r as f64).collect();

        let mut b_fft = VectorField::zeros(grid);
        conv.add_field(&m, &ms, &mut b_fft).unwrap();

        let n = grid.n_cells();
        for r in 0..n {
            let mut b = [0.0; 3];
            for r2 in 0..n {
                for a in 0..3 {
                    for c in 0..3 {
                        b[a] += kernel.between(a, c, r, r2) * ms[r2] * m.data[r2][c];
                    }
                }
            }
            for a in 0..3 {
                let scale = 8e5 * MU0;
                assert!(
                    (b[a] - b_fft.data[r][a]).abs() < 1e-10 * scale,
                    "cell {} comp {}: direct {} fft {}",
                    r,
                    a,
                    b[a],
                    b_fft.data[r][a]
                );
            }
        }
    }
}
