// src/effective_field/zeeman.rs

use crate::error::Result;
use crate::params::System;
use crate::vector_field::VectorField;

/// Add the applied induction B_ext (Tesla) of every cell.
pub fn add_zeeman_field(sys: &System, b_eff: &mut VectorField) -> Result<()> {
    b_eff.ensure_grid(&sys.grid, "zeeman output")?;
    for (b, ext) in b_eff.data.iter_mut().zip(&sys.b_ext.data) {
        b[0] += ext[0];
        b[1] += ext[1];
        b[2] += ext[2];
    }
    Ok(())
}
