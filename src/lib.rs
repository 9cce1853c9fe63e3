// src/lib.rs

pub mod amplitudes;
pub mod complex_field;
pub mod config;
pub mod dispersion;
pub mod effective_field;
pub mod eigen;
pub mod error;
pub mod grid;
pub mod gyro;
pub mod interactions;
pub mod linearize;
pub mod minimize;
pub mod operator;
pub mod ovf;
pub mod params;
pub mod rotation;
pub mod tensor;
pub mod vec3;
pub mod vector_field;
pub mod visualisation;

pub use error::{Error, Result};
