// src/eigen/compare.rs
//
// Equivalence of mode sets produced by different strategies.
//
// Eigenvectors are only defined up to a phase, and inside a degenerate
// eigenspace up to an arbitrary unitary mixing, so modes are compared by
// projection: each mode of A must lie in the span of the modes of B whose
// frequencies fall inside a relative window around its own.

use num_complex::Complex64;

use crate::complex_field::ComplexField;
use crate::error::{Error, Result};

use super::ModeSet;

/// Frequencies below this fraction of the spectral scale are compared absolutely.
const FREQUENCY_FLOOR: f64 = 1e-9;

/// Span vectors whose orthogonalised norm drops below this fraction are dependent.
const DEPENDENT_RTOL: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct Tolerances {
    /// Relative frequency tolerance; also the width of the partner window.
    pub frequency: f64,
    /// Maximum relative residual of a mode after projection onto its partners.
    pub subspace: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            frequency: 1e-6,
            subspace: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EquivalenceReport {
    pub compared: usize,
    pub max_frequency_error: f64,
    pub max_subspace_residual: f64,
}

/// Ascending angular frequency; ties broken by the real part of the eigenvalue.
pub fn sort_by_frequency(set: &mut ModeSet) {
    let mut order: Vec<usize> = (0..set.len()).collect();
    order.sort_by(|&a, &b| {
        set.frequencies[a]
            .total_cmp(&set.frequencies[b])
            .then_with(|| set.eigenvalues[a].re.total_cmp(&set.eigenvalues[b].re))
    });
    set.eigenvalues = order.iter().map(|&i| set.eigenvalues[i]).collect();
    set.frequencies = order.iter().map(|&i| set.frequencies[i]).collect();
    set.modes = permute(std::mem::take(&mut set.modes), &order);
    if let Some(reduced) = set.reduced.take() {
        set.reduced = Some(permute(reduced, &order));
    }
}

fn permute(items: Vec<ComplexField>, order: &[usize]) -> Vec<ComplexField> {
    let mut slots: Vec<Option<ComplexField>> = items.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

fn spectral_scale(freqs: &[f64]) -> f64 {
    freqs.iter().map(|w| w.abs()).fold(0.0, f64::max)
}

/// Sorted frequency lists of equal length agree pairwise within `rel_tol`.
pub fn frequencies_agree(a: &[f64], b: &[f64], rel_tol: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    let floor = FREQUENCY_FLOOR * spectral_scale(&a).max(spectral_scale(&b));
    a.iter()
        .zip(&b)
        .all(|(x, y)| (x - y).abs() <= rel_tol * x.abs().max(y.abs()).max(floor))
}

/// Largest relative residual ‖v − P_B v‖ / ‖v‖ over the vectors of `a`, where
/// P_B projects onto span(`b`).
pub fn subspace_residual(a: &[&ComplexField], b: &[&ComplexField]) -> Result<f64> {
    let mut q: Vec<ComplexField> = Vec::with_capacity(b.len());
    for s in b {
        let mut w = (*s).clone();
        project_out(&q, &mut w)?;
        let norm = w.norm();
        if norm > DEPENDENT_RTOL * s.norm() {
            w.scale_real(1.0 / norm);
            q.push(w);
        }
    }

    let mut worst: f64 = 0.0;
    for v in a {
        let v_norm = v.norm();
        if v_norm == 0.0 {
            return Err(Error::Degenerate("cannot project a zero mode".to_string()));
        }
        let mut r = (*v).clone();
        project_out(&q, &mut r)?;
        worst = worst.max(r.norm() / v_norm);
    }
    Ok(worst)
}

/// Two Gram-Schmidt passes against the orthonormal set `q`.
fn project_out(q: &[ComplexField], w: &mut ComplexField) -> Result<()> {
    for _ in 0..2 {
        for qi in q {
            let c = ComplexField::dotc(qi, w)?;
            w.axpy(-c, qi)?;
        }
    }
    Ok(())
}

/// |⟨v, v⟩ − 1| < tol
pub fn is_normalised(v: &ComplexField, tol: f64) -> bool {
    let vv: f64 = v.norm().powi(2);
    (vv - 1.0).abs() < tol
}

/// Check that every mode of `a` has a partner subspace in `b`.
///
/// `a` may be a subset of `b` (an iterative solve against a dense one).
pub fn assert_equivalent(a: &ModeSet, b: &ModeSet, tol: &Tolerances) -> Result<EquivalenceReport> {
    if a.is_empty() {
        return Err(Error::NotEquivalent("first mode set is empty".to_string()));
    }
    if a.len() > b.len() {
        return Err(Error::NotEquivalent(format!(
            "first mode set has {} modes, second only {}",
            a.len(),
            b.len()
        )));
    }
    let floor = FREQUENCY_FLOOR * spectral_scale(&a.frequencies).max(spectral_scale(&b.frequencies));

    let mut report = EquivalenceReport::default();
    for (i, (&w, mode)) in a.frequencies.iter().zip(&a.modes).enumerate() {
        let reference = w.abs().max(floor);
        let window = tol.frequency * reference;
        let partners: Vec<&ComplexField> = b
            .frequencies
            .iter()
            .zip(&b.modes)
            .filter(|(wb, _)| (**wb - w).abs() <= window)
            .map(|(_, v)| v)
            .collect();
        if partners.is_empty() {
            return Err(Error::NotEquivalent(format!(
                "mode {i} at {w:.6e} rad/s has no partner within {window:.3e} rad/s"
            )));
        }
        let freq_err = b
            .frequencies
            .iter()
            .map(|wb| (wb - w).abs() / reference)
            .fold(f64::INFINITY, f64::min);
        let residual = subspace_residual(&[mode], &partners)?;
        if residual > tol.subspace {
            return Err(Error::NotEquivalent(format!(
                "mode {i} at {w:.6e} rad/s: subspace residual {residual:.3e} exceeds {:.3e}",
                tol.subspace
            )));
        }
        report.compared += 1;
        report.max_frequency_error = report.max_frequency_error.max(freq_err);
        report.max_subspace_residual = report.max_subspace_residual.max(residual);
    }
    Ok(report)
}

/// Multiply a mode by a unit phase; used to check phase invariance.
pub fn with_phase(v: &ComplexField, phase: f64) -> ComplexField {
    let mut out = v.clone();
    out.scale(Complex64::from_polar(1.0, phase));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;

    fn grid() -> Grid3D {
        Grid3D::new(2, 2, 1, 1.0, 1.0, 1.0)
    }

    fn unit(seed: u64) -> ComplexField {
        let mut v = ComplexField::random(3, grid(), seed);
        v.normalize().unwrap();
        v
    }

    fn set(freqs: &[f64], modes: Vec<ComplexField>) -> ModeSet {
        let ev = freqs.iter().map(|&w| Complex64::new(0.0, w)).collect();
        ModeSet::new(ev, modes, None).unwrap()
    }

    #[test]
    fn sorting_keeps_modes_with_their_frequencies() {
        let (a, b) = (unit(1), unit(2));
        let s = set(&[5.0, -2.0], vec![a.clone(), b.clone()]);
        assert_eq!(s.frequencies, vec![-2.0, 5.0]);
        assert_eq!(s.modes[0], b);
        assert_eq!(s.modes[1], a);
    }

    #[test]
    fn degenerate_mixing_has_zero_residual() {
        let (a, b, c) = (unit(3), unit(4), unit(5));
        // Any combination of a and b lies in their span.
        let mut mix = with_phase(&a, 0.3);
        mix.axpy(Complex64::new(0.2, -0.7), &b).unwrap();
        mix.normalize().unwrap();
        assert!(subspace_residual(&[&mix], &[&a, &b]).unwrap() < 1e-12);
        assert!(subspace_residual(&[&c], &[&a, &b]).unwrap() > 0.1);
    }

    #[test]
    fn frequency_lists_compare_after_sorting() {
        assert!(frequencies_agree(&[3.0, -1.0], &[-1.0, 3.0 + 1e-9], 1e-6));
        assert!(!frequencies_agree(&[3.0, -1.0], &[-1.0, 3.1], 1e-6));
        assert!(!frequencies_agree(&[1.0], &[1.0, 2.0], 1e-6));
    }

    #[test]
    fn subset_with_changed_phases_is_equivalent() {
        let modes: Vec<ComplexField> = (10..14).map(unit).collect();
        let full = set(&[-3.0, -1.0, 1.0, 3.0], modes.clone());
        let sub = set(&[1.0 + 1e-9, -1.0], vec![with_phase(&modes[2], 1.1), modes[1].clone()]);
        let report = assert_equivalent(&sub, &full, &Tolerances::default()).unwrap();
        assert_eq!(report.compared, 2);
        assert!(report.max_subspace_residual < 1e-12);
        assert!(report.max_frequency_error < 1e-8);
    }

    #[test]
    fn wrong_frequency_or_profile_is_rejected() {
        let modes: Vec<ComplexField> = (20..22).map(unit).collect();
        let full = set(&[1.0, 2.0], modes.clone());
        let shifted = set(&[1.5], vec![modes[0].clone()]);
        assert!(matches!(
            assert_equivalent(&shifted, &full, &Tolerances::default()),
            Err(Error::NotEquivalent(_))
        ));
        let swapped = set(&[1.0], vec![modes[1].clone()]);
        assert!(matches!(
            assert_equivalent(&swapped, &full, &Tolerances::default()),
            Err(Error::NotEquivalent(_))
        ));
    }

    #[test]
    fn normalisation_check() {
        let v = unit(7);
        assert!(is_normalised(&v, 1e-12));
        let mut w = v.clone();
        w.scale_real(1.01);
        assert!(!is_normalised(&w, 1e-5));
    }
}
