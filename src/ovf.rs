// src/ovf.rs
//
// OVF writers for ground states and mode profiles.
// Supports OOMMF OVF 2.0 rectangular meshes:
//  - text data (MuMax-like)
//  - binary4 data (fast + compact)
//
// Binary4 uses little-endian floats and starts with the OVF2 check value 1234567.0f.
// A complex mode profile is written as two files, one per part.

use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::complex_field::ComplexField;
use crate::eigen::ModeSet;
use crate::error::{Error, Result};
use crate::grid::Grid3D;
use crate::vector_field::VectorField;

#[derive(Clone, Debug, Default)]
pub struct OvfMeta {
    pub title: String,
    pub desc_lines: Vec<String>,
    pub valuelabels: [String; 3],
    pub valueunits: [String; 3],
}

impl OvfMeta {
    pub fn magnetization() -> Self {
        Self {
            title: "m".to_string(),
            desc_lines: vec![],
            valuelabels: ["m_x".into(), "m_y".into(), "m_z".into()],
            valueunits: ["1".into(), "1".into(), "1".into()],
        }
    }

    /// Metadata for one part ("re" or "im") of a mode profile.
    pub fn mode(index: usize, part: &str, omega: f64) -> Self {
        let mut meta = Self {
            title: format!("mode_{index}_{part}"),
            desc_lines: vec![],
            valuelabels: [
                format!("v_x_{part}"),
                format!("v_y_{part}"),
                format!("v_z_{part}"),
            ],
            valueunits: ["1".into(), "1".into(), "1".into()],
        };
        meta.push_desc_line(format!("frequency_rad_per_s: {:.16e}", omega));
        meta.push_desc_line(format!(
            "frequency_Hz: {:.16e}",
            omega / (2.0 * std::f64::consts::PI)
        ));
        meta
    }

    pub fn push_desc_line<S: Into<String>>(&mut self, s: S) {
        self.desc_lines.push(s.into());
    }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(())
}

fn write_header<W: Write>(w: &mut W, grid: &Grid3D, meta: &OvfMeta) -> std::io::Result<()> {
    writeln!(w, "# OOMMF OVF 2.0")?;
    writeln!(w, "# Segment count: 1")?;
    writeln!(w, "# Begin: Segment")?;
    writeln!(w, "# Begin: Header")?;
    writeln!(w, "# Title: {}", meta.title)?;
    writeln!(w, "# meshtype: rectangular")?;
    writeln!(w, "# meshunit: m")?;

    writeln!(w, "# xmin: {:.16e}", 0.0)?;
    writeln!(w, "# ymin: {:.16e}", 0.0)?;
    writeln!(w, "# zmin: {:.16e}", 0.0)?;
    writeln!(w, "# xmax: {:.16e}", grid.nx as f64 * grid.dx)?;
    writeln!(w, "# ymax: {:.16e}", grid.ny as f64 * grid.dy)?;
    writeln!(w, "# zmax: {:.16e}", grid.nz as f64 * grid.dz)?;

    writeln!(w, "# valuedim: 3")?;
    writeln!(
        w,
        "# valuelabels: {} {} {}",
        meta.valuelabels[0], meta.valuelabels[1], meta.valuelabels[2]
    )?;
    writeln!(
        w,
        "# valueunits: {} {} {}",
        meta.valueunits[0], meta.valueunits[1], meta.valueunits[2]
    )?;

    for d in &meta.desc_lines {
        writeln!(w, "# Desc: {}", d)?;
    }

    writeln!(w, "# xbase: {:.16e}", 0.5 * grid.dx)?;
    writeln!(w, "# ybase: {:.16e}", 0.5 * grid.dy)?;
    writeln!(w, "# zbase: {:.16e}", 0.5 * grid.dz)?;
    writeln!(w, "# xnodes: {}", grid.nx)?;
    writeln!(w, "# ynodes: {}", grid.ny)?;
    writeln!(w, "# znodes: {}", grid.nz)?;
    writeln!(w, "# xstepsize: {:.16e}", grid.dx)?;
    writeln!(w, "# ystepsize: {:.16e}", grid.dy)?;
    writeln!(w, "# zstepsize: {:.16e}", grid.dz)?;

    writeln!(w, "# End: Header")?;
    Ok(())
}

pub fn write_ovf2_rectangular_text(path: &Path, m: &VectorField, meta: &OvfMeta) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut w = BufWriter::new(File::create(path)?);
    write_header(&mut w, &m.grid, meta)?;
    writeln!(w, "# Begin: Data Text")?;

    // x fastest, then y, then z (matches the grid's linear index)
    for v in &m.data {
        writeln!(w, "{:.10e} {:.10e} {:.10e}", v[0], v[1], v[2])?;
    }

    writeln!(w, "# End: Data Text")?;
    writeln!(w, "# End: Segment")?;
    w.flush()?;
    Ok(())
}

pub fn write_ovf2_rectangular_binary4(path: &Path, m: &VectorField, meta: &OvfMeta) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut f = BufWriter::new(File::create(path)?);
    write_header(&mut f, &m.grid, meta)?;
    writeln!(f, "# Begin: Data Binary 4")?;

    // OVF2 binary4 check value (little endian)
    let check: f32 = 1234567.0;
    f.write_all(&check.to_le_bytes())?;

    for v in &m.data {
        for c in v {
            f.write_all(&(*c as f32).to_le_bytes())?;
        }
    }

    writeln!(f)?;
    writeln!(f, "# End: Data Binary 4")?;
    writeln!(f, "# End: Segment")?;
    f.flush()?;
    Ok(())
}

/// Ground-state export: OVF 2.0 text with magnetisation labels.
pub fn write_vector_field(path: &Path, m: &VectorField) -> Result<()> {
    write_ovf2_rectangular_text(path, m, &OvfMeta::magnetization())
}

/// Split a 3-component complex profile into real and imaginary vector fields.
pub fn mode_parts(mode: &ComplexField) -> Result<(VectorField, VectorField)> {
    if mode.n_comp() != 3 {
        return Err(Error::shape("mode profile", "3 components", mode.n_comp()));
    }
    Ok((mode.re.to_vector_field()?, mode.im.to_vector_field()?))
}

/// Write `mode_XXXX_re.ovf` and `mode_XXXX_im.ovf` into `dir`.
pub fn write_mode_pair(dir: &Path, index: usize, omega: f64, mode: &ComplexField) -> Result<[PathBuf; 2]> {
    let (re, im) = mode_parts(mode)?;
    let p_re = dir.join(format!("mode_{index:04}_re.ovf"));
    let p_im = dir.join(format!("mode_{index:04}_im.ovf"));
    write_ovf2_rectangular_text(&p_re, &re, &OvfMeta::mode(index, "re", omega))?;
    write_ovf2_rectangular_text(&p_im, &im, &OvfMeta::mode(index, "im", omega))?;
    Ok([p_re, p_im])
}

/// Frequency table: `index,omega_rad_per_s,frequency_hz,re_lambda`.
pub fn write_frequencies_csv(path: &Path, modes: &ModeSet) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "index,omega_rad_per_s,frequency_hz,re_lambda")?;
    for (i, (omega, lambda)) in modes.frequencies.iter().zip(&modes.eigenvalues).enumerate() {
        writeln!(
            w,
            "{},{:.16e},{:.16e},{:.16e}",
            i,
            omega,
            modes.frequency_hz(i),
            lambda.re
        )?;
    }
    w.flush()?;
    Ok(())
}

/// Write every mode with positive frequency plus `frequencies.csv`.
///
/// Negative-frequency partners are complex conjugates and carry no extra
/// information, so only the positive half is exported.
pub fn write_modes(dir: &Path, modes: &ModeSet) -> Result<usize> {
    create_dir_all(dir)?;
    write_frequencies_csv(&dir.join("frequencies.csv"), modes)?;
    let positive = modes.positive();
    for (k, &i) in positive.iter().enumerate() {
        write_mode_pair(dir, k, modes.frequencies[i], &modes.modes[i])?;
    }
    Ok(positive.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn grid() -> Grid3D {
        Grid3D::new(2, 2, 1, 1e-9, 1e-9, 1e-9)
    }

    #[test]
    fn text_file_has_header_and_one_line_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.ovf");
        let m = VectorField::uniform(grid(), [0.0, 1.0, 0.0]);
        write_vector_field(&path, &m).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# OOMMF OVF 2.0"));
        assert!(text.contains("# xnodes: 2"));
        assert!(text.contains("# znodes: 1"));
        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(data.len(), 4);
        let vals: Vec<f64> = data[0].split_whitespace().map(|s| s.parse().unwrap()).collect();
        assert_eq!(vals, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn binary_file_carries_check_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("m.ovf");
        let m = VectorField::new(grid());
        write_ovf2_rectangular_binary4(&path, &m, &OvfMeta::magnetization()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let marker = b"# Begin: Data Binary 4\n";
        let start = bytes
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let check = f32::from_le_bytes(bytes[start..start + 4].try_into().unwrap());
        assert_eq!(check, 1234567.0);
    }

    #[test]
    fn mode_pair_files_record_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let mut mode = ComplexField::zeros(3, grid());
        mode.set(0, 1, Complex64::new(0.5, -0.5));
        let omega = 2.0 * std::f64::consts::PI * 1e9;
        let [re, im] = write_mode_pair(dir.path(), 3, omega, &mode).unwrap();
        assert!(re.ends_with("mode_0003_re.ovf"));

        let text = std::fs::read_to_string(&im).unwrap();
        let hz: f64 = text
            .lines()
            .find_map(|l| l.strip_prefix("# Desc: frequency_Hz: "))
            .unwrap()
            .parse()
            .unwrap();
        assert!((hz - 1e9).abs() < 1e-3);
        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        let second: Vec<f64> = data[1].split_whitespace().map(|s| s.parse().unwrap()).collect();
        assert_eq!(second[0], -0.5);
    }

    #[test]
    fn only_positive_modes_are_exported() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = ComplexField::zeros(3, grid());
        a.set(0, 0, Complex64::new(1.0, 0.0));
        let b = a.conj();
        let set = ModeSet::new(
            vec![Complex64::new(0.0, 2.0), Complex64::new(0.0, -2.0)],
            vec![a, b],
            None,
        )
        .unwrap();
        assert_eq!(write_modes(dir.path(), &set).unwrap(), 1);
        assert!(dir.path().join("mode_0000_re.ovf").exists());
        assert!(!dir.path().join("mode_0001_re.ovf").exists());
        let csv = std::fs::read_to_string(dir.path().join("frequencies.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }
}
