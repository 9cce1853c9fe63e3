// src/visualisation.rs

use std::path::Path;

use plotters::prelude::*;

use crate::complex_field::ComplexField;
use crate::eigen::ModeSet;
use crate::error::{Error, Result};

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Map a value in [0, 1] to white -> red.
fn amplitude_to_color(x: f64) -> RGBColor {
    let x = if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 };
    let gb = (255.0 * (1.0 - x)) as u8;
    RGBColor(255, gb, gb)
}

/// Save the spectrum as a PNG: frequency (GHz) against mode index.
/// Only positive-frequency modes are drawn.
pub fn save_spectrum_plot(modes: &ModeSet, path: &Path) -> Result<()> {
    let ghz: Vec<f64> = modes
        .positive()
        .iter()
        .map(|&i| modes.frequency_hz(i) * 1e-9)
        .collect();
    if ghz.is_empty() {
        return Err(Error::Plot("no positive-frequency modes to plot".to_string()));
    }
    let f_max = ghz.iter().copied().fold(0.0, f64::max) * 1.1;

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(30)
        .caption("Spin-wave spectrum", ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..ghz.len() as i32, 0.0..f_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("mode index")
        .y_desc("frequency (GHz)")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(
            ghz.iter()
                .enumerate()
                .map(|(i, f)| Circle::new((i as i32, *f), 4, BLUE.filled())),
        )
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Save |v| of a lab-frame mode profile on layer `k` as a PNG heat map.
/// - x/y axes are cell indices
/// - colour encodes the local amplitude (white = 0, red = max on the layer)
pub fn save_mode_plot(mode: &ComplexField, k: usize, title: &str, path: &Path) -> Result<()> {
    let grid = *mode.grid();
    if k >= grid.nz {
        return Err(Error::Config(format!("layer {k} outside grid with nz = {}", grid.nz)));
    }
    let amp: Vec<f64> = (0..grid.nx * grid.ny)
        .map(|ij| {
            let r = k * grid.nx * grid.ny + ij;
            (0..mode.n_comp())
                .map(|c| mode.get(c, r).norm_sqr())
                .sum::<f64>()
                .sqrt()
        })
        .collect();
    let max_amp = amp.iter().copied().fold(0.0, f64::max);
    let scale = if max_amp > 0.0 { 1.0 / max_amp } else { 0.0 };

    let nx = grid.nx as i32;
    let ny = grid.ny as i32;
    let root = BitMapBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0..nx, 0..ny)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("x (cell index)")
        .y_desc("y (cell index)")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series((0..nx).flat_map(|i| {
            let amp = &amp;
            (0..ny).map(move |j| {
                let a = amp[j as usize * grid.nx + i as usize] * scale;
                Rectangle::new([(i, j), (i + 1, j + 1)], amplitude_to_color(a).filled())
            })
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}
